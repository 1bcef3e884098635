//! Fetch request shapes and their normalization
//!
//! A fetch takes one to three logical arguments: a key descriptor, then an
//! optional sub-key and/or calculator. [`FetchRequest`] names the four valid
//! shapes; [`FetchRequest::from_args`] resolves a positional argument list
//! into one of them, and [`FetchRequest::normalize`] validates it into the
//! `(options, sub_key, calculator)` triple the cacher works with.

use serde_json::{Map, Value};

use crate::calculator::Calculator;
use crate::config::{CacheConfig, check_expires};
use crate::error::CacheError;
use crate::key::{SubKey, render_number};

/// A positional argument of the variable-arity call convention
#[derive(Debug)]
pub enum Arg {
    Value(Value),
    Calculator(Calculator),
}

impl From<Calculator> for Arg {
    fn from(calculator: Calculator) -> Self {
        Arg::Calculator(calculator)
    }
}

macro_rules! arg_from_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Value(Value::from(value))
                }
            }
        )*
    };
}

arg_from_value!(Value, &str, String, i32, i64, u32, u64, f64, Map<String, Value>);

/// The shapes a fetch call can take
#[derive(Debug)]
pub enum FetchRequest {
    KeyOnly {
        key: Value,
    },
    KeyAndSub {
        key: Value,
        sub: Value,
    },
    KeyAndCalculator {
        key: Value,
        calculator: Calculator,
    },
    KeyAndSubAndCalculator {
        key: Value,
        sub: Value,
        calculator: Calculator,
    },
}

impl FetchRequest {
    /// Request for a key descriptor alone.
    pub fn key(key: impl Into<Value>) -> Self {
        FetchRequest::KeyOnly { key: key.into() }
    }

    /// Attach a sub-key, keeping any calculator already present.
    pub fn with_sub(self, sub: impl Into<Value>) -> Self {
        let sub = sub.into();
        match self {
            FetchRequest::KeyOnly { key } | FetchRequest::KeyAndSub { key, .. } => {
                FetchRequest::KeyAndSub { key, sub }
            }
            FetchRequest::KeyAndCalculator { key, calculator }
            | FetchRequest::KeyAndSubAndCalculator {
                key, calculator, ..
            } => FetchRequest::KeyAndSubAndCalculator {
                key,
                sub,
                calculator,
            },
        }
    }

    /// Attach a calculator, keeping any sub-key already present.
    pub fn with_calculator(self, calculator: Calculator) -> Self {
        match self {
            FetchRequest::KeyOnly { key } | FetchRequest::KeyAndCalculator { key, .. } => {
                FetchRequest::KeyAndCalculator { key, calculator }
            }
            FetchRequest::KeyAndSub { key, sub }
            | FetchRequest::KeyAndSubAndCalculator { key, sub, .. } => {
                FetchRequest::KeyAndSubAndCalculator {
                    key,
                    sub,
                    calculator,
                }
            }
        }
    }

    /// Resolve a positional argument list.
    ///
    /// With two arguments the second is the calculator if it is one, and the
    /// sub-key otherwise. With three, the third must be a calculator.
    pub fn from_args(args: Vec<Arg>) -> Result<Self, CacheError> {
        let mut args = args.into_iter();
        let (first, second, third) = (args.next(), args.next(), args.next());
        if args.next().is_some() {
            return Err(CacheError::invalid(
                "at most a key, a sub-key and a calculator can be passed",
            ));
        }

        let Some(first) = first else {
            return Err(CacheError::invalid(
                "at least a cache element name is required",
            ));
        };
        let key = match first {
            Arg::Value(key) => key,
            Arg::Calculator(_) => {
                return Err(CacheError::invalid(
                    "either an object or a cache key should be passed as the first argument",
                ));
            }
        };

        match (second, third) {
            (None, _) => Ok(FetchRequest::KeyOnly { key }),
            (Some(Arg::Calculator(calculator)), None) => {
                Ok(FetchRequest::KeyAndCalculator { key, calculator })
            }
            (Some(Arg::Value(sub)), None) => Ok(FetchRequest::KeyAndSub { key, sub }),
            (Some(Arg::Value(sub)), Some(Arg::Calculator(calculator))) => {
                Ok(FetchRequest::KeyAndSubAndCalculator {
                    key,
                    sub,
                    calculator,
                })
            }
            (Some(Arg::Calculator(_)), Some(_)) => Err(CacheError::invalid(
                "key sub-information should be either a string, a number or a plain object",
            )),
            (Some(Arg::Value(_)), Some(Arg::Value(_))) => Err(CacheError::invalid(
                "calculator should be a function that returns the value to store in cache",
            )),
        }
    }

    /// Validate the request into its canonical form.
    pub fn normalize(self, config: &CacheConfig) -> Result<NormalizedRequest, CacheError> {
        let (key, sub, calculator) = match self {
            FetchRequest::KeyOnly { key } => (key, None, None),
            FetchRequest::KeyAndSub { key, sub } => (key, Some(sub), None),
            FetchRequest::KeyAndCalculator { key, calculator } => (key, None, Some(calculator)),
            FetchRequest::KeyAndSubAndCalculator {
                key,
                sub,
                calculator,
            } => (key, Some(sub), Some(calculator)),
        };

        let options = FetchOptions::from_descriptor(key, config)?;
        let sub_key = sub.map(sub_key_from_value).transpose()?;

        Ok(NormalizedRequest {
            options,
            sub_key,
            calculator: calculator.unwrap_or_else(Calculator::null),
        })
    }
}

macro_rules! request_from_key {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FetchRequest {
                fn from(key: $ty) -> Self {
                    FetchRequest::key(key)
                }
            }
        )*
    };
}

request_from_key!(Value, &str, String, i32, i64, u32, u64, f64, Map<String, Value>);

impl TryFrom<Vec<Arg>> for FetchRequest {
    type Error = CacheError;

    fn try_from(args: Vec<Arg>) -> Result<Self, Self::Error> {
        FetchRequest::from_args(args)
    }
}

/// Options resolved from a key descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Base key, before the prefix is applied
    pub title: String,
    /// TTL in seconds
    pub expires: u64,
    /// Unrecognized descriptor fields, carried through unused
    pub extra: Map<String, Value>,
}

impl FetchOptions {
    fn from_descriptor(descriptor: Value, config: &CacheConfig) -> Result<Self, CacheError> {
        let mut fields = match descriptor {
            Value::String(title) => return Self::titled(title, config),
            Value::Number(number) => return Self::titled(render_number(&number), config),
            Value::Object(fields) => fields,
            _ => {
                return Err(CacheError::invalid(
                    "either an object or a cache key should be passed as the first argument",
                ));
            }
        };

        let title = match fields.remove("title") {
            Some(Value::String(title)) => title,
            _ => return Err(CacheError::invalid("key should be a string value")),
        };

        let expires = match fields.remove("expires") {
            None => config.expires,
            Some(value) => match value.as_u64() {
                Some(expires) => check_expires(expires)?,
                None => {
                    return Err(CacheError::invalid(format!(
                        "expires should be a positive number of seconds, got {value}"
                    )));
                }
            },
        };

        let mut options = Self::titled(title, config)?;
        options.expires = expires;
        options.extra = fields;
        Ok(options)
    }

    fn titled(title: String, config: &CacheConfig) -> Result<Self, CacheError> {
        if title.is_empty() {
            return Err(CacheError::invalid("key should not be empty"));
        }
        Ok(Self {
            title,
            expires: config.expires,
            extra: Map::new(),
        })
    }
}

fn sub_key_from_value(sub: Value) -> Result<SubKey, CacheError> {
    match sub {
        Value::String(text) => Ok(SubKey::Text(text)),
        Value::Number(number) => Ok(SubKey::Number(number)),
        Value::Object(map) => Ok(SubKey::Map(map)),
        _ => Err(CacheError::invalid(
            "key sub-information should be either a string, a number or a plain object",
        )),
    }
}

/// Canonical `(options, sub_key, calculator)` triple
#[derive(Debug)]
pub struct NormalizedRequest {
    pub options: FetchOptions,
    pub sub_key: Option<SubKey>,
    pub calculator: Calculator,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> CacheConfig {
        CacheConfig::default()
    }

    fn calc() -> Calculator {
        Calculator::from_callback(|done| done.ok(1))
    }

    fn assert_invalid<T: std::fmt::Debug>(result: Result<T, CacheError>) {
        match result {
            Err(CacheError::InvalidArgument(_)) => {}
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_args_rejected() {
        assert_invalid(FetchRequest::from_args(vec![]));
    }

    #[test]
    fn test_too_many_args_rejected() {
        assert_invalid(FetchRequest::from_args(vec![
            "a".into(),
            "b".into(),
            calc().into(),
            "d".into(),
        ]));
    }

    #[test]
    fn test_two_args_calculator_or_sub() {
        let request = FetchRequest::from_args(vec!["a".into(), calc().into()]).unwrap();
        assert!(matches!(request, FetchRequest::KeyAndCalculator { .. }));

        let request = FetchRequest::from_args(vec!["a".into(), 7.into()]).unwrap();
        assert!(matches!(request, FetchRequest::KeyAndSub { sub, .. } if sub == json!(7)));
    }

    #[test]
    fn test_three_args_require_calculator_last() {
        let request =
            FetchRequest::from_args(vec!["a".into(), json!({}).into(), calc().into()]).unwrap();
        assert!(matches!(request, FetchRequest::KeyAndSubAndCalculator { .. }));

        assert_invalid(FetchRequest::from_args(vec![
            "another_item".into(),
            json!({}).into(),
            "test".into(),
        ]));
        assert_invalid(FetchRequest::from_args(vec![
            "a".into(),
            calc().into(),
            calc().into(),
        ]));
    }

    #[test]
    fn test_calculator_as_key_rejected() {
        assert_invalid(FetchRequest::from_args(vec![calc().into()]));
    }

    #[test]
    fn test_string_and_number_descriptors() {
        let normalized = FetchRequest::key("cached_item").normalize(&config()).unwrap();
        assert_eq!(normalized.options.title, "cached_item");
        assert_eq!(normalized.options.expires, 300);
        assert!(normalized.sub_key.is_none());

        let normalized = FetchRequest::key(123).normalize(&config()).unwrap();
        assert_eq!(normalized.options.title, "123");

        let normalized = FetchRequest::key(1.5).normalize(&config()).unwrap();
        assert_eq!(normalized.options.title, "1.5");
    }

    #[test]
    fn test_object_descriptor_fills_defaults() {
        let normalized = FetchRequest::key(json!({"title": "item", "owner": "me"}))
            .normalize(&config().with_expires(60))
            .unwrap();
        assert_eq!(normalized.options.title, "item");
        assert_eq!(normalized.options.expires, 60);
        assert_eq!(normalized.options.extra.get("owner"), Some(&json!("me")));

        let normalized = FetchRequest::key(json!({"title": "item", "expires": 1}))
            .normalize(&config())
            .unwrap();
        assert_eq!(normalized.options.expires, 1);

        let normalized = FetchRequest::key(json!({"title": "item", "expires": i64::MAX}))
            .normalize(&config())
            .unwrap();
        assert_eq!(normalized.options.expires, i64::MAX as u64);
    }

    #[test]
    fn test_invalid_descriptors() {
        assert_invalid(FetchRequest::key(Value::Null).normalize(&config()));
        assert_invalid(FetchRequest::key(true).normalize(&config()));
        assert_invalid(FetchRequest::key(json!(["a"])).normalize(&config()));
        assert_invalid(FetchRequest::key(f64::NAN).normalize(&config()));
        assert_invalid(FetchRequest::key("").normalize(&config()));
        assert_invalid(FetchRequest::key(json!({"name": "x"})).normalize(&config()));
        assert_invalid(FetchRequest::key(json!({"title": 5})).normalize(&config()));
        assert_invalid(FetchRequest::key(json!({"title": "x", "expires": 0})).normalize(&config()));
        assert_invalid(
            FetchRequest::key(json!({"title": "x", "expires": "soon"})).normalize(&config()),
        );
        assert_invalid(
            FetchRequest::key(json!({"title": "x", "expires": u64::MAX})).normalize(&config()),
        );
    }

    #[test]
    fn test_sub_key_types() {
        for sub in [json!("string"), json!(123), json!({"object": "accepted"})] {
            let normalized = FetchRequest::key("k")
                .with_sub(sub)
                .with_calculator(calc())
                .normalize(&config())
                .unwrap();
            assert!(normalized.sub_key.is_some());
        }

        for sub in [Value::Null, json!(false), json!([1, 2])] {
            assert_invalid(FetchRequest::key("k").with_sub(sub).normalize(&config()));
        }
    }

    #[test]
    fn test_builder_keeps_existing_parts() {
        let request = FetchRequest::key("k").with_calculator(calc()).with_sub("s");
        assert!(matches!(request, FetchRequest::KeyAndSubAndCalculator { .. }));

        let request = FetchRequest::key("k").with_sub("s").with_calculator(calc());
        assert!(matches!(request, FetchRequest::KeyAndSubAndCalculator { .. }));
    }
}
