//! JSON ↔ GraphQL value conversion and JSON-backed output types.

use async_graphql::dynamic::{Field, FieldFuture, Object, ResolverContext, TypeRef};
use async_graphql::{Name, Value};
use topicstream_core::RequestArgs;
use tracing::warn;

/// Converts a serde_json::Value to an async_graphql::Value.
pub fn json_to_graphql_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else if let Some(f) = n.as_f64() {
                Value::Number(
                    async_graphql::Number::from_f64(f)
                        .unwrap_or_else(|| async_graphql::Number::from(0)),
                )
            } else {
                Value::Null
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => {
            Value::List(arr.into_iter().map(json_to_graphql_value).collect())
        }
        serde_json::Value::Object(obj) => Value::Object(
            obj.into_iter()
                .map(|(k, v)| (Name::new(k), json_to_graphql_value(v)))
                .collect(),
        ),
    }
}

/// Collects the coerced field arguments as JSON.
///
/// Values that cannot be represented in JSON (e.g. uploads) are skipped.
pub(crate) fn request_args(ctx: &ResolverContext<'_>) -> RequestArgs {
    ctx.args
        .as_index_map()
        .iter()
        .filter_map(|(name, value)| match value.clone().into_json() {
            Ok(json) => Some((name.to_string(), json)),
            Err(e) => {
                warn!(argument = %name, error = %e, "Skipping non-JSON argument");
                None
            }
        })
        .collect()
}

/// Builds an output object whose fields read from the JSON parent value.
///
/// Subscription resolvers project payloads into plain JSON objects; this type
/// exposes each listed key as a field.
///
/// ```ignore
/// let notification = json_object_type(
///     "Notification",
///     [
///         ("id", TypeRef::named_nn(TypeRef::INT)),
///         ("message", TypeRef::named(TypeRef::STRING)),
///     ],
/// );
/// ```
pub fn json_object_type<I, N>(name: &str, fields: I) -> Object
where
    I: IntoIterator<Item = (N, TypeRef)>,
    N: Into<String>,
{
    fields
        .into_iter()
        .fold(Object::new(name), |object, (field_name, ty)| {
            let field_name: String = field_name.into();
            let key = field_name.clone();
            object.field(Field::new(field_name, ty, move |ctx| {
                let key = key.clone();
                FieldFuture::new(async move {
                    match ctx.parent_value.as_value() {
                        Some(Value::Object(obj)) => Ok(obj.get(key.as_str()).cloned()),
                        _ => Ok(None),
                    }
                })
            }))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_to_graphql_value() {
        let value = json_to_graphql_value(json!({
            "id": 2,
            "ratio": 0.77,
            "message": "hi",
            "tags": ["a", null],
            "ok": true
        }));

        let Value::Object(obj) = value else {
            panic!("expected object");
        };
        assert_eq!(obj.get("id"), Some(&Value::Number(2.into())));
        assert_eq!(obj.get("message"), Some(&Value::String("hi".into())));
        assert_eq!(obj.get("ok"), Some(&Value::Boolean(true)));
        assert_eq!(
            obj.get("tags"),
            Some(&Value::List(vec![Value::String("a".into()), Value::Null]))
        );
        assert!(matches!(obj.get("ratio"), Some(Value::Number(_))));
    }

    #[test]
    fn test_json_object_type_name() {
        let object = json_object_type(
            "Notification",
            [
                ("id", TypeRef::named_nn(TypeRef::INT)),
                ("message", TypeRef::named(TypeRef::STRING)),
            ],
        );
        assert_eq!(object.type_name(), "Notification");
    }
}
