//! Parameter resolution and type coercion.
//!
//! Each [`ParamSpec`] names a source key. Keys wrapped in `@@…@@` are tokens:
//! `@@userid@@` and `@@username@@` read the caller identity, any other token
//! is looked up among the context's custom tokens. Plain keys are looked up
//! in the call arguments, case-insensitively, with JSON `null` counting as
//! absent. The resolved JSON value is then coerced to the declared
//! [`ParamType`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use procdispatch_core::{Args, CommandDefinition, Error, ExecutionContext, ParamSpec, ParamType, Result};
use serde_json::Value;
use uuid::Uuid;

use crate::backend::{BoundParam, SqlValue};

/// Delimiter that marks a source key as a token.
pub const TOKEN_DELIMITER: &str = "@@";

/// Reserved token for the caller's numeric id.
pub const CALLER_ID_TOKEN: &str = "userid";

/// Reserved token for the caller's name.
pub const CALLER_NAME_TOKEN: &str = "username";

/// Where a parameter value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource<'a> {
    /// `@@userid@@`
    CallerId,
    /// `@@username@@`
    CallerName,
    /// Any other `@@name@@`
    Token(&'a str),
    /// A call argument
    Arg(&'a str),
}

impl<'a> ParamSource<'a> {
    /// Classify a source key.
    pub fn parse(key: &'a str) -> Self {
        let key = key.trim();
        let token = key
            .strip_prefix(TOKEN_DELIMITER)
            .and_then(|rest| rest.strip_suffix(TOKEN_DELIMITER))
            .filter(|name| !name.is_empty());
        match token {
            Some(name) if name.eq_ignore_ascii_case(CALLER_ID_TOKEN) => ParamSource::CallerId,
            Some(name) if name.eq_ignore_ascii_case(CALLER_NAME_TOKEN) => ParamSource::CallerName,
            Some(name) => ParamSource::Token(name),
            None => ParamSource::Arg(key),
        }
    }
}

/// Resolve and coerce every parameter of `def`, in definition order.
///
/// # Errors
///
/// - [`Error::MissingContext`] for an identity token without a context
/// - [`Error::UnknownToken`] for a custom token the context does not carry
/// - [`Error::RequiredParameterMissing`] for an absent non-optional value
/// - [`Error::InvalidParameter`] when coercion fails
pub fn bind_params(
    def: &CommandDefinition,
    args: Option<&Args>,
    ctx: Option<&ExecutionContext>,
) -> Result<Vec<BoundParam>> {
    def.params
        .iter()
        .map(|spec| {
            let raw = resolve(spec, args, ctx)?;
            let value = match raw {
                Some(v) => coerce(spec, &v)?,
                None if spec.optional => SqlValue::Null,
                None => {
                    return Err(Error::RequiredParameterMissing {
                        command: def.id.clone(),
                        param: spec.name.clone(),
                        from_key: spec.source_key().to_string(),
                    })
                }
            };
            Ok(BoundParam {
                name: spec.name.clone(),
                ty: spec.ty,
                value,
            })
        })
        .collect()
}

/// Look up the raw value for one parameter. `None` means absent.
pub fn resolve(
    spec: &ParamSpec,
    args: Option<&Args>,
    ctx: Option<&ExecutionContext>,
) -> Result<Option<Value>> {
    let key = spec.source_key();
    let value = match ParamSource::parse(key) {
        ParamSource::CallerId => Some(Value::from(require_context(ctx, key)?.user_id)),
        ParamSource::CallerName => Some(Value::from(require_context(ctx, key)?.user_name.clone())),
        ParamSource::Token(name) => {
            let ctx = ctx.ok_or_else(|| Error::UnknownToken {
                token: name.to_string(),
                available: Vec::new(),
            })?;
            let value = ctx.token(name).ok_or_else(|| Error::UnknownToken {
                token: name.to_string(),
                available: ctx.token_names(),
            })?;
            Some(value.clone())
        }
        ParamSource::Arg(name) => args.and_then(|a| a.get(name)).cloned(),
    };
    Ok(value.filter(|v| !v.is_null()))
}

fn require_context<'c>(ctx: Option<&'c ExecutionContext>, key: &str) -> Result<&'c ExecutionContext> {
    ctx.ok_or_else(|| Error::MissingContext {
        token: key.trim().to_string(),
    })
}

/// Convert a JSON value into the native value for `spec.ty`.
pub fn coerce(spec: &ParamSpec, value: &Value) -> Result<SqlValue> {
    let invalid = |reason: String| Error::InvalidParameter {
        param: spec.name.clone(),
        expected: spec.ty.as_str().to_string(),
        reason,
    };
    match spec.ty {
        ParamType::Int => {
            let n = integer(value).map_err(invalid)?;
            i32::try_from(n)
                .map(SqlValue::Int)
                .map_err(|_| invalid(format!("{} is out of range", n)))
        }
        ParamType::BigInt => integer(value).map(SqlValue::BigInt).map_err(invalid),
        ParamType::String => Ok(SqlValue::String(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        ParamType::Date => text(value)
            .and_then(parse_date)
            .map(SqlValue::Date)
            .map_err(invalid),
        ParamType::DateTime => text(value)
            .and_then(parse_datetime)
            .map(SqlValue::DateTime)
            .map_err(invalid),
        ParamType::Bit => bit(value).map(SqlValue::Bit).map_err(invalid),
        ParamType::Decimal => match value {
            Value::Number(n) => Ok(SqlValue::Decimal(n.to_string())),
            Value::String(s) if s.trim().parse::<f64>().is_ok() => {
                Ok(SqlValue::Decimal(s.trim().to_string()))
            }
            other => Err(invalid(format!("'{}' is not a decimal number", other))),
        },
        ParamType::Float => match value {
            Value::Number(n) => n
                .as_f64()
                .map(SqlValue::Float)
                .ok_or_else(|| invalid(format!("{} is not representable", n))),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(SqlValue::Float)
                .map_err(|e| invalid(e.to_string())),
            other => Err(invalid(format!("'{}' is not a number", other))),
        },
        // A string argument is taken to already be JSON text
        ParamType::Json => Ok(SqlValue::Json(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        ParamType::Guid => text(value)
            .and_then(|s| Uuid::parse_str(s).map_err(|e| e.to_string()))
            .map(SqlValue::Guid)
            .map_err(invalid),
    }
}

fn integer(value: &Value) -> std::result::Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("{} is not an integer", n)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{}' is not an integer", s)),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(format!("'{}' is not an integer", other)),
    }
}

fn text(value: &Value) -> std::result::Result<&str, String> {
    match value {
        Value::String(s) => Ok(s.trim()),
        other => Err(format!("'{}' is not a string", other)),
    }
}

fn bit(value: &Value) -> std::result::Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(format!("{} is not 0 or 1", n)),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(format!("'{}' is not a boolean", s)),
        },
        other => Err(format!("'{}' is not a boolean", other)),
    }
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| parse_datetime(s).map(|dt| dt.date()))
        .map_err(|_| format!("'{}' is not a date (YYYY-MM-DD)", s))
}

/// Offset-carrying timestamps are normalized to UTC.
fn parse_datetime(s: &str) -> std::result::Result<NaiveDateTime, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("'{}' is not a date-time", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str, from: &str, ty: ParamType) -> ParamSpec {
        ParamSpec {
            name: name.into(),
            from: from.into(),
            ty,
            optional: false,
        }
    }

    #[test]
    fn test_parse_sources() {
        assert_eq!(ParamSource::parse("@@UserId@@"), ParamSource::CallerId);
        assert_eq!(ParamSource::parse("@@username@@"), ParamSource::CallerName);
        assert_eq!(ParamSource::parse("@@tenant@@"), ParamSource::Token("tenant"));
        assert_eq!(ParamSource::parse("Name"), ParamSource::Arg("Name"));
        assert_eq!(ParamSource::parse("@@@@"), ParamSource::Arg("@@@@"));
    }

    #[test]
    fn test_identity_token_without_context() {
        let s = spec("@UserId", "@@userid@@", ParamType::Int);
        let err = resolve(&s, None, None).unwrap_err();
        assert!(matches!(err, Error::MissingContext { .. }));
    }

    #[test]
    fn test_unknown_custom_token_lists_available() {
        let ctx = ExecutionContext::new(1, "ann").with_token("region", json!("eu"));
        let s = spec("@Tenant", "@@tenant@@", ParamType::String);
        match resolve(&s, None, Some(&ctx)).unwrap_err() {
            Error::UnknownToken { token, available } => {
                assert_eq!(token, "tenant");
                assert_eq!(available, vec!["region".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_null_argument_is_absent() {
        let args = Args::new().with("name", Value::Null);
        let s = spec("@Name", "", ParamType::String);
        assert_eq!(resolve(&s, Some(&args), None).unwrap(), None);
    }

    #[test]
    fn test_coerce_int_range_and_strings() {
        let s = spec("@N", "", ParamType::Int);
        assert_eq!(coerce(&s, &json!(" 42 ")).unwrap(), SqlValue::Int(42));
        assert!(matches!(
            coerce(&s, &json!(5_000_000_000i64)),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(coerce(&s, &json!(1.5)).is_err());
    }

    #[test]
    fn test_coerce_dates() {
        let d = spec("@D", "", ParamType::Date);
        assert_eq!(
            coerce(&d, &json!("2024-02-29")).unwrap(),
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        let dt = spec("@T", "", ParamType::DateTime);
        let expected = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(coerce(&dt, &json!("2024-01-01T12:00:00+02:00")).unwrap(), SqlValue::DateTime(expected));
        assert_eq!(coerce(&dt, &json!("2024-01-01 10:00:00")).unwrap(), SqlValue::DateTime(expected));
        assert!(coerce(&d, &json!("yesterday")).is_err());
    }

    #[test]
    fn test_coerce_bit_guid_json() {
        let b = spec("@B", "", ParamType::Bit);
        assert_eq!(coerce(&b, &json!("YES")).unwrap(), SqlValue::Bit(true));
        assert_eq!(coerce(&b, &json!(0)).unwrap(), SqlValue::Bit(false));
        assert!(coerce(&b, &json!(2)).is_err());

        let g = spec("@G", "", ParamType::Guid);
        assert!(coerce(&g, &json!("67e55044-10b1-426f-9247-bb680e5fe0c8")).is_ok());
        assert!(coerce(&g, &json!("not-a-guid")).is_err());

        let j = spec("@J", "", ParamType::Json);
        assert_eq!(coerce(&j, &json!({"a": 1})).unwrap(), SqlValue::Json(r#"{"a":1}"#.into()));
    }

    #[test]
    fn test_bind_params_optional_and_required() {
        let def = CommandDefinition::from_json(
            r#"{"id":"c","procedure":"p","connection":"main",
                "params":[{"name":"@A","type":"int"},{"name":"@B","optional":true}]}"#,
            "test",
        )
        .unwrap();

        let bound = bind_params(&def, Some(&Args::new().with("a", json!(3))), None).unwrap();
        assert_eq!(bound[0].value, SqlValue::Int(3));
        assert_eq!(bound[1].value, SqlValue::Null);

        match bind_params(&def, None, None).unwrap_err() {
            Error::RequiredParameterMissing { param, from_key, .. } => {
                assert_eq!(param, "@A");
                assert_eq!(from_key, "A");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
