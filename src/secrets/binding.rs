//! Binding secret bundles onto typed structures.
//!
//! A bundle is a flat map of scalars, while consumers usually want a struct.
//! [`bind`] drives `serde` over the bundle with two extra rules:
//!
//! - **Dotted keys nest.** `DB.HOST` lands in field `HOST` of the nested
//!   struct bound from `DB`. When a key is both a leaf and a prefix of other
//!   keys (`DB` and `DB.HOST`), the nested form wins.
//! - **Weak typing.** Scalars are coerced to the type the field asks for:
//!
//! | stored            | requested | result                                   |
//! |-------------------|-----------|------------------------------------------|
//! | string            | bool      | `1 t T TRUE true True` → true, `0 f F FALSE false False` → false, `""` → false |
//! | string            | number    | parsed, `""` → 0                         |
//! | bool              | string    | `"1"` / `"0"`                            |
//! | number            | string    | decimal form                             |
//! | number            | bool      | non-zero → true                          |
//! | bool              | number    | 1 / 0                                    |
//!
//! A string that cannot be parsed into the requested type is a binding error.
//! Fields absent from the bundle need `#[serde(default)]` on the target so
//! they keep their default value.

use serde::de::value::{Error as ValueError, MapDeserializer};
use serde::de::{self, DeserializeOwned, Deserializer, IntoDeserializer, Unexpected, Visitor};
use serde::forward_to_deserialize_any;
use std::collections::BTreeMap;

use super::error::{Result, SecretsError};
use super::types::{SecretBundle, SecretValue};

type BindResult<T> = std::result::Result<T, ValueError>;

/// Bind `bundle` onto `T` using the nesting and coercion rules above.
pub fn bind<T: DeserializeOwned>(bundle: &SecretBundle) -> Result<T> {
    T::deserialize(Node::Branch(nest(bundle))).map_err(|e| SecretsError::binding(e.to_string()))
}

enum Node {
    Leaf(SecretValue),
    Branch(BTreeMap<String, Node>),
}

fn nest(bundle: &SecretBundle) -> BTreeMap<String, Node> {
    // Sorted so that `DB` is always seen before `DB.HOST`.
    let mut keys: Vec<&String> = bundle.keys().collect();
    keys.sort();

    let mut root = BTreeMap::new();
    for key in keys {
        let path: Vec<&str> = key.split('.').collect();
        insert(&mut root, &path, bundle[key].clone());
    }
    root
}

fn insert(map: &mut BTreeMap<String, Node>, path: &[&str], value: SecretValue) {
    match path {
        [] => {}
        [last] => {
            map.entry(last.to_string()).or_insert(Node::Leaf(value));
        }
        [head, rest @ ..] => {
            let node =
                map.entry(head.to_string()).or_insert_with(|| Node::Branch(BTreeMap::new()));
            if let Node::Leaf(_) = node {
                *node = Node::Branch(BTreeMap::new());
            }
            if let Node::Branch(children) = node {
                insert(children, rest, value);
            }
        }
    }
}

impl<'de> IntoDeserializer<'de, ValueError> for Node {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

macro_rules! forward_to_scalar {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> BindResult<V::Value> {
                match self {
                    Node::Leaf(value) => Scalar(value).$method(visitor),
                    Node::Branch(_) => self.deserialize_any(visitor),
                }
            }
        )*
    };
}

impl<'de> Deserializer<'de> for Node {
    type Error = ValueError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> BindResult<V::Value> {
        match self {
            Node::Leaf(value) => Scalar(value).deserialize_any(visitor),
            Node::Branch(children) => {
                let mut map = MapDeserializer::new(children.into_iter());
                let value = visitor.visit_map(&mut map)?;
                map.end()?;
                Ok(value)
            }
        }
    }

    forward_to_scalar! {
        deserialize_bool
        deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64 deserialize_i128
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64 deserialize_u128
        deserialize_f32 deserialize_f64
        deserialize_char deserialize_str deserialize_string
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> BindResult<V::Value> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> BindResult<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> BindResult<V::Value> {
        match self {
            Node::Leaf(value) => Scalar(value).deserialize_enum(name, variants, visitor),
            Node::Branch(_) => Err(de::Error::invalid_type(Unexpected::Map, &visitor)),
        }
    }

    forward_to_deserialize_any! {
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct identifier ignored_any
    }
}

/// A single stored value, coerced on demand.
struct Scalar(SecretValue);

impl Scalar {
    fn unexpected(&self) -> Unexpected<'_> {
        match &self.0 {
            SecretValue::Bool(b) => Unexpected::Bool(*b),
            SecretValue::Number(n) => match n.as_f64() {
                Some(f) => Unexpected::Float(f),
                None => Unexpected::Other("number"),
            },
            SecretValue::String(s) => Unexpected::Str(s),
        }
    }

    fn invalid(&self, expected: &'static str) -> ValueError {
        de::Error::invalid_value(self.unexpected(), &expected)
    }

    fn to_bool(&self) -> BindResult<bool> {
        match &self.0 {
            SecretValue::Bool(b) => Ok(*b),
            SecretValue::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
            SecretValue::String(s) => match s.as_str() {
                "" => Ok(false),
                "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
                "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
                _ => Err(self.invalid("a boolean")),
            },
        }
    }

    fn to_i64(&self) -> BindResult<i64> {
        match &self.0 {
            SecretValue::Bool(b) => Ok(i64::from(*b)),
            SecretValue::Number(n) => n
                .as_i64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0)
                        .filter(|f| (i64::MIN as f64..=i64::MAX as f64).contains(f))
                        .map(|f| f as i64)
                })
                .ok_or_else(|| self.invalid("a signed integer")),
            SecretValue::String(s) if s.is_empty() => Ok(0),
            SecretValue::String(s) => {
                s.trim().parse().map_err(|_| self.invalid("a signed integer"))
            }
        }
    }

    fn to_u64(&self) -> BindResult<u64> {
        match &self.0 {
            SecretValue::Bool(b) => Ok(u64::from(*b)),
            SecretValue::Number(n) => n
                .as_u64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && (0.0..=u64::MAX as f64).contains(f))
                        .map(|f| f as u64)
                })
                .ok_or_else(|| self.invalid("an unsigned integer")),
            SecretValue::String(s) if s.is_empty() => Ok(0),
            SecretValue::String(s) => {
                s.trim().parse().map_err(|_| self.invalid("an unsigned integer"))
            }
        }
    }

    fn to_f64(&self) -> BindResult<f64> {
        match &self.0 {
            SecretValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            SecretValue::Number(n) => {
                n.as_f64().ok_or_else(|| self.invalid("a floating point number"))
            }
            SecretValue::String(s) if s.is_empty() => Ok(0.0),
            SecretValue::String(s) => {
                s.trim().parse().map_err(|_| self.invalid("a floating point number"))
            }
        }
    }

    fn into_string(self) -> String {
        match self.0 {
            SecretValue::Bool(true) => "1".to_string(),
            SecretValue::Bool(false) => "0".to_string(),
            SecretValue::Number(n) => n.to_string(),
            SecretValue::String(s) => s,
        }
    }
}

macro_rules! coerce_signed {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> BindResult<V::Value> {
                visitor.visit_i64(self.to_i64()?)
            }
        )*
    };
}

macro_rules! coerce_unsigned {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> BindResult<V::Value> {
                visitor.visit_u64(self.to_u64()?)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for Scalar {
    type Error = ValueError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> BindResult<V::Value> {
        match self.0 {
            SecretValue::Bool(b) => visitor.visit_bool(b),
            SecretValue::Number(n) => {
                if let Some(u) = n.as_u64() {
                    visitor.visit_u64(u)
                } else if let Some(i) = n.as_i64() {
                    visitor.visit_i64(i)
                } else {
                    visitor.visit_f64(n.as_f64().unwrap_or_default())
                }
            }
            SecretValue::String(s) => visitor.visit_string(s),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> BindResult<V::Value> {
        visitor.visit_bool(self.to_bool()?)
    }

    coerce_signed! {
        deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64 deserialize_i128
    }
    coerce_unsigned! {
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64 deserialize_u128
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> BindResult<V::Value> {
        visitor.visit_f64(self.to_f64()?)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> BindResult<V::Value> {
        visitor.visit_f64(self.to_f64()?)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> BindResult<V::Value> {
        visitor.visit_string(self.into_string())
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> BindResult<V::Value> {
        visitor.visit_string(self.into_string())
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> BindResult<V::Value> {
        visitor.visit_string(self.into_string())
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> BindResult<V::Value> {
        visitor.visit_enum(self.into_string().into_deserializer())
    }

    forward_to_deserialize_any! {
        bytes byte_buf option unit unit_struct newtype_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn bundle(entries: &[(&str, SecretValue)]) -> SecretBundle {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[derive(Debug, Default, PartialEq, Deserialize)]
    #[serde(default)]
    struct ClientSecrets {
        #[serde(rename = "ENV_1")]
        env1: String,
        #[serde(rename = "ENV_2")]
        env2: bool,
        #[serde(rename = "ENV_3")]
        env3: String,
        #[serde(rename = "ENV_4")]
        env4: i64,
    }

    #[test]
    fn test_bind_coerces_strings() {
        let secrets = bundle(&[
            ("ENV_1", "val 1".into()),
            ("ENV_2", "true".into()),
            ("ENV_3", "val 2".into()),
            ("ENV_4", "5".into()),
        ]);

        let bound: ClientSecrets = bind(&secrets).unwrap();
        assert_eq!(
            bound,
            ClientSecrets { env1: "val 1".into(), env2: true, env3: "val 2".into(), env4: 5 }
        );
    }

    #[test]
    fn test_absent_fields_keep_defaults() {
        let bound: ClientSecrets = bind(&bundle(&[("ENV_1", "value".into())])).unwrap();
        assert_eq!(bound, ClientSecrets { env1: "value".into(), ..Default::default() });
    }

    #[test]
    fn test_empty_string_is_false_and_zero() {
        let bound: ClientSecrets =
            bind(&bundle(&[("ENV_2", "".into()), ("ENV_4", "".into())])).unwrap();
        assert!(!bound.env2);
        assert_eq!(bound.env4, 0);
    }

    #[test]
    fn test_bool_string_variants() {
        let cases = [
            ("1", true),
            ("t", true),
            ("TRUE", true),
            ("True", true),
            ("0", false),
            ("F", false),
            ("False", false),
        ];
        for (raw, expected) in cases {
            let bound: ClientSecrets = bind(&bundle(&[("ENV_2", raw.into())])).unwrap();
            assert_eq!(bound.env2, expected, "input {raw:?}");
        }
    }

    #[test]
    fn test_scalars_to_string() {
        let bound: ClientSecrets =
            bind(&bundle(&[("ENV_1", true.into()), ("ENV_3", 42i64.into())])).unwrap();
        assert_eq!(bound.env1, "1");
        assert_eq!(bound.env3, "42");
    }

    #[test]
    fn test_number_and_bool_cross_coercion() {
        let bound: ClientSecrets =
            bind(&bundle(&[("ENV_2", 3i64.into()), ("ENV_4", true.into())])).unwrap();
        assert!(bound.env2);
        assert_eq!(bound.env4, 1);
    }

    #[test]
    fn test_unparseable_string_is_binding_error() {
        let err = bind::<ClientSecrets>(&bundle(&[("ENV_4", "five".into())])).unwrap_err();
        assert!(matches!(err, SecretsError::Binding { .. }));

        let err = bind::<ClientSecrets>(&bundle(&[("ENV_2", "yes".into())])).unwrap_err();
        assert!(matches!(err, SecretsError::Binding { .. }));
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Database {
        #[serde(rename = "HOST")]
        host: String,
        #[serde(rename = "PORT")]
        port: u16,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Nested {
        #[serde(rename = "DB")]
        db: Database,
        #[serde(rename = "NAME")]
        name: Option<String>,
    }

    #[test]
    fn test_dotted_keys_nest() {
        let bound: Nested = bind(&bundle(&[
            ("DB.HOST", "db.internal".into()),
            ("DB.PORT", "5432".into()),
            ("NAME", "svc".into()),
        ]))
        .unwrap();

        assert_eq!(bound.db.host, "db.internal");
        assert_eq!(bound.db.port, 5432);
        assert_eq!(bound.name.as_deref(), Some("svc"));
    }

    #[test]
    fn test_nested_form_wins_over_leaf() {
        let bound: Nested =
            bind(&bundle(&[("DB", "flat".into()), ("DB.HOST", "db.internal".into())])).unwrap();
        assert_eq!(bound.db.host, "db.internal");
    }

    #[test]
    fn test_out_of_range_integer() {
        let err = bind::<Nested>(&bundle(&[("DB.PORT", "70000".into())])).unwrap_err();
        assert!(matches!(err, SecretsError::Binding { .. }));
    }

    #[test]
    fn test_bind_into_map() {
        let bound: std::collections::HashMap<String, String> =
            bind(&bundle(&[("A", "x".into()), ("B", 2i64.into())])).unwrap();
        assert_eq!(bound["A"], "x");
        assert_eq!(bound["B"], "2");
    }
}
