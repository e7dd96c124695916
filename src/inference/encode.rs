//! Response encoding and accept negotiation.

use std::fmt::Write as _;

use super::decode::TEXT_CSV;
use super::error::InferenceError;
use super::predict::PredictionResult;

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_JSONLINES: &str = "application/jsonlines";

/// Wire encodings a response can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// One line per row, outputs joined by `,`.
    #[default]
    Csv,
    /// A single JSON array; nested per row for multi-output models.
    Json,
    /// One JSON value per row, newline terminated.
    JsonLines,
}

impl ResponseFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ResponseFormat::Csv => TEXT_CSV,
            ResponseFormat::Json => APPLICATION_JSON,
            ResponseFormat::JsonLines => APPLICATION_JSONLINES,
        }
    }

    fn from_media_range(range: &str) -> Option<Self> {
        match range {
            "" | "*/*" | "text/*" | TEXT_CSV => Some(ResponseFormat::Csv),
            "application/*" | APPLICATION_JSON => Some(ResponseFormat::Json),
            APPLICATION_JSONLINES | "application/jsonl" | "application/x-jsonlines" => {
                Some(ResponseFormat::JsonLines)
            }
            _ => None,
        }
    }

    /// Pick the encoding for an `Accept` value.
    ///
    /// The first supported media range in the list wins. Media-type
    /// parameters such as `q=` are ignored. A missing or empty value means
    /// CSV.
    pub fn negotiate(accept: Option<&str>) -> Result<Self, InferenceError> {
        let Some(accept) = accept else {
            return Ok(ResponseFormat::Csv);
        };

        accept
            .split(',')
            .map(|range| range.split(';').next().unwrap_or_default().trim())
            .find_map(Self::from_media_range)
            .ok_or_else(|| InferenceError::UnsupportedAcceptType(accept.to_string()))
    }
}

/// Encoded response body together with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedResponse {
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

impl EncodedResponse {
    /// Body as text. Every supported encoding is UTF-8.
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or_default()
    }
}

/// Serialize `result` for the client's `accept` value.
pub fn encode(result: &PredictionResult, accept: Option<&str>) -> Result<EncodedResponse, InferenceError> {
    let format = ResponseFormat::negotiate(accept)?;
    let scores = result.scores();

    let body = match format {
        ResponseFormat::Csv => {
            let mut out = String::with_capacity(scores.len() * 8);
            for row in scores.rows() {
                for (i, value) in row.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    // Writing into a String cannot fail.
                    let _ = write!(out, "{value}");
                }
                out.push('\n');
            }
            out.into_bytes()
        }
        ResponseFormat::Json => {
            if result.n_outputs() == 1 {
                serde_json::to_vec(&scores.column(0).to_vec())?
            } else {
                let rows: Vec<Vec<f64>> = scores.rows().into_iter().map(|r| r.to_vec()).collect();
                serde_json::to_vec(&rows)?
            }
        }
        ResponseFormat::JsonLines => {
            let mut out = Vec::new();
            for row in scores.rows() {
                if result.n_outputs() == 1 {
                    serde_json::to_writer(&mut out, &row[0])?;
                } else {
                    serde_json::to_writer(&mut out, &row.to_vec())?;
                }
                out.push(b'\n');
            }
            out
        }
    };

    Ok(EncodedResponse {
        body,
        content_type: format.content_type(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rstest::rstest;

    fn single(values: &[f64]) -> PredictionResult {
        let scores = ndarray::Array2::from_shape_vec((values.len(), 1), values.to_vec()).unwrap();
        PredictionResult::new(scores)
    }

    #[test]
    fn csv_one_line_per_row() {
        let encoded = encode(&single(&[0.5, 0.5]), Some(TEXT_CSV)).unwrap();
        assert_eq!(encoded.text(), "0.5\n0.5\n");
        assert_eq!(encoded.content_type, TEXT_CSV);
    }

    #[test]
    fn csv_uses_shortest_float_form() {
        let encoded = encode(&single(&[3.0, -0.25, 1e-7]), None).unwrap();
        assert_eq!(encoded.text(), "3\n-0.25\n0.0000001\n");
    }

    #[test]
    fn csv_joins_outputs_with_commas() {
        let result = PredictionResult::new(array![[0.1, 0.9], [0.6, 0.4]]);
        let encoded = encode(&result, Some(TEXT_CSV)).unwrap();
        assert_eq!(encoded.text(), "0.1,0.9\n0.6,0.4\n");
    }

    #[test]
    fn empty_result_encodes_to_empty_body() {
        let result = PredictionResult::new(ndarray::Array2::zeros((0, 1)));
        assert!(encode(&result, Some(TEXT_CSV)).unwrap().body.is_empty());
        assert_eq!(encode(&result, Some(APPLICATION_JSON)).unwrap().text(), "[]");
    }

    #[test]
    fn json_flat_for_single_output() {
        let encoded = encode(&single(&[0.5, 2.0]), Some(APPLICATION_JSON)).unwrap();
        assert_eq!(encoded.text(), "[0.5,2.0]");
        assert_eq!(encoded.content_type, APPLICATION_JSON);
    }

    #[test]
    fn json_nested_for_multi_output() {
        let result = PredictionResult::new(array![[0.25, 0.75]]);
        let encoded = encode(&result, Some(APPLICATION_JSON)).unwrap();
        assert_eq!(encoded.text(), "[[0.25,0.75]]");
    }

    #[test]
    fn jsonlines_one_value_per_line() {
        let encoded = encode(&single(&[1.5, 2.5]), Some(APPLICATION_JSONLINES)).unwrap();
        assert_eq!(encoded.text(), "1.5\n2.5\n");

        let result = PredictionResult::new(array![[1.0, 0.0]]);
        let encoded = encode(&result, Some(APPLICATION_JSONLINES)).unwrap();
        assert_eq!(encoded.text(), "[1.0,0.0]\n");
    }

    #[rstest]
    #[case(None, ResponseFormat::Csv)]
    #[case(Some(""), ResponseFormat::Csv)]
    #[case(Some("*/*"), ResponseFormat::Csv)]
    #[case(Some("text/csv"), ResponseFormat::Csv)]
    #[case(Some("text/csv; charset=utf-8"), ResponseFormat::Csv)]
    #[case(Some("application/json"), ResponseFormat::Json)]
    #[case(Some("image/png, application/json;q=0.9, text/csv"), ResponseFormat::Json)]
    #[case(Some("application/jsonlines"), ResponseFormat::JsonLines)]
    fn negotiate_picks_first_supported(
        #[case] accept: Option<&str>,
        #[case] expected: ResponseFormat,
    ) {
        assert_eq!(ResponseFormat::negotiate(accept).unwrap(), expected);
    }

    #[rstest]
    #[case("application/xml")]
    #[case("image/png, text/html")]
    fn negotiate_rejects_unsupported(#[case] accept: &str) {
        let err = ResponseFormat::negotiate(Some(accept)).unwrap_err();
        assert!(matches!(err, InferenceError::UnsupportedAcceptType(ref a) if a == accept));

        let err = encode(&single(&[1.0]), Some(accept)).unwrap_err();
        assert!(matches!(err, InferenceError::UnsupportedAcceptType(_)));
    }
}
