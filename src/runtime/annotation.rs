//! Annotation formats and conversion of annotation payloads
//!
//! A stage submits annotations as `[format_id, [text, ...]]`. Conversion
//! validates that shape against the formats the decoder declared at load time
//! and produces an owned [`Annotation`].

use super::errors::AnnotationError;
use super::value::Value;

/// A statically declared annotation format (id + description)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationFormat {
    pub id: String,
    pub description: String,
}

impl AnnotationFormat {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// Validated annotation payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Index into the decoder's annotation formats
    pub format: usize,
    /// Texts, usually from longest to shortest
    pub texts: Vec<String>,
}

/// Validate an annotation payload submitted by `decoder`
///
/// Checks run in order and the first failure is returned:
/// 1. the value is a list or tuple
/// 2. it has exactly two elements
/// 3. the first element is an integer
/// 4. that integer indexes one of `formats`
/// 5. the second element is a list
/// 6. every item of the second element is a string
pub fn convert(
    decoder: &str,
    formats: &[AnnotationFormat],
    value: &Value,
) -> Result<Annotation, AnnotationError> {
    let items = value.as_sequence().ok_or_else(|| AnnotationError::NotAList {
        decoder: decoder.to_string(),
        found: value.type_name(),
    })?;

    if items.len() != 2 {
        return Err(AnnotationError::WrongLength {
            decoder: decoder.to_string(),
            len: items.len(),
        });
    }

    let format = items[0]
        .as_int()
        .ok_or_else(|| AnnotationError::FormatNotInteger {
            decoder: decoder.to_string(),
        })?;

    let format_index = usize::try_from(format)
        .ok()
        .filter(|&i| i < formats.len())
        .ok_or_else(|| AnnotationError::UnregisteredFormat {
            decoder: decoder.to_string(),
            format,
        })?;

    let Value::List(texts) = &items[1] else {
        return Err(AnnotationError::StringsNotAList {
            decoder: decoder.to_string(),
        });
    };

    let texts = texts
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| AnnotationError::MalformedStrings {
            decoder: decoder.to_string(),
        })?;

    Ok(Annotation {
        format: format_index,
        texts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formats() -> Vec<AnnotationFormat> {
        vec![
            AnnotationFormat::new("bit", "Bit value"),
            AnnotationFormat::new("data", "Data word"),
        ]
    }

    #[test]
    fn test_valid_annotation() {
        let value = Value::annotation(0, ["1"]);
        let ann = convert("spi", &formats(), &value).unwrap();
        assert_eq!(ann.format, 0);
        assert_eq!(ann.texts, vec!["1".to_string()]);
    }

    #[test]
    fn test_tuple_outer_container_accepted() {
        let value = Value::tuple([Value::Int(1), Value::list(["Data: 0x42", "0x42", "42"])]);
        let ann = convert("spi", &formats(), &value).unwrap();
        assert_eq!(ann.format, 1);
        assert_eq!(ann.texts, vec!["Data: 0x42", "0x42", "42"]);
    }

    #[test]
    fn test_text_tuple_rejected() {
        let value = Value::list([Value::Int(1), Value::tuple(["Data: 0x42", "0x42"])]);
        let err = convert("spi", &formats(), &value).unwrap_err();
        assert!(matches!(err, AnnotationError::StringsNotAList { .. }));
    }

    #[test]
    fn test_empty_text_list_accepted() {
        let value = Value::annotation(1, Vec::<String>::new());
        let ann = convert("spi", &formats(), &value).unwrap();
        assert!(ann.texts.is_empty());
    }

    #[test]
    fn test_not_a_list() {
        let err = convert("spi", &formats(), &Value::from("bit")).unwrap_err();
        assert_eq!(
            err,
            AnnotationError::NotAList {
                decoder: "spi".into(),
                found: "str"
            }
        );
        assert!(err.to_string().contains("submitted str instead of list"));
    }

    #[test]
    fn test_wrong_length() {
        let value = Value::list([Value::Int(0), Value::list(["1"]), Value::None]);
        let err = convert("spi", &formats(), &value).unwrap_err();
        assert_eq!(
            err,
            AnnotationError::WrongLength {
                decoder: "spi".into(),
                len: 3
            }
        );
        assert!(err.to_string().contains("with 3 elements"));
    }

    #[test]
    fn test_format_not_integer() {
        let value = Value::list([Value::from("0"), Value::list(["1"])]);
        let err = convert("spi", &formats(), &value).unwrap_err();
        assert!(matches!(err, AnnotationError::FormatNotInteger { .. }));

        let value = Value::list([Value::Bool(false), Value::list(["1"])]);
        let err = convert("spi", &formats(), &value).unwrap_err();
        assert!(matches!(err, AnnotationError::FormatNotInteger { .. }));
    }

    #[test]
    fn test_unregistered_format() {
        let err = convert("spi", &formats(), &Value::annotation(5, ["x"])).unwrap_err();
        assert_eq!(
            err,
            AnnotationError::UnregisteredFormat {
                decoder: "spi".into(),
                format: 5
            }
        );

        let value = Value::list([Value::Int(-1), Value::list(["x"])]);
        let err = convert("spi", &formats(), &value).unwrap_err();
        assert!(matches!(err, AnnotationError::UnregisteredFormat { format: -1, .. }));
    }

    #[test]
    fn test_strings_not_a_list() {
        let value = Value::list([Value::Int(0), Value::from("1")]);
        let err = convert("spi", &formats(), &value).unwrap_err();
        assert!(matches!(err, AnnotationError::StringsNotAList { .. }));
    }

    #[test]
    fn test_malformed_strings() {
        let value = Value::list([Value::Int(0), Value::list([Value::from("1"), Value::Int(1)])]);
        let err = convert("spi", &formats(), &value).unwrap_err();
        assert!(matches!(err, AnnotationError::MalformedStrings { .. }));
    }
}
