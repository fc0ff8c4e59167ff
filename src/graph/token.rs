//! Deferred values
//!
//! Most identifiers in the graph are not known until the provisioning
//! backend has created the resource that owns them. A [`Token`] stands in
//! for such a value and serializes to the intrinsic the backend resolves.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{json, Value};

/// Separator of the two halves of a composite identifier
pub const COMPOSITE_SEPARATOR: &str = "|";

/// Which half of a `domainId|entityId` composite to select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositePart {
    Domain,
    Entity,
}

impl CompositePart {
    pub fn index(self) -> usize {
        match self {
            CompositePart::Domain => 0,
            CompositePart::Entity => 1,
        }
    }
}

/// A value that may only be known at provisioning time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Literal(String),
    /// Primary identifier of another node
    Ref(String),
    /// Named attribute of another node
    Attr { logical_id: String, attribute: String },
    /// One half of another node's composite identifier
    Part { logical_id: String, part: CompositePart },
    /// Concatenation of tokens
    Join(Vec<Token>),
    AccountId,
    Region,
}

impl Token {
    pub fn literal(value: impl Into<String>) -> Self {
        Token::Literal(value.into())
    }

    pub fn reference(logical_id: impl Into<String>) -> Self {
        Token::Ref(logical_id.into())
    }

    pub fn attr(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Token::Attr {
            logical_id: logical_id.into(),
            attribute: attribute.into(),
        }
    }

    /// Concatenate parts. Adjacent literals are folded together, nested
    /// joins are flattened, and a join that folds to one part collapses
    /// into that part.
    pub fn join(parts: impl IntoIterator<Item = Token>) -> Self {
        let mut folded: Vec<Token> = Vec::new();
        for part in parts {
            let pieces = match part {
                Token::Join(inner) => inner,
                other => vec![other],
            };
            for piece in pieces {
                if let Token::Literal(s) = &piece {
                    if s.is_empty() {
                        continue;
                    }
                    if let Some(Token::Literal(prev)) = folded.last_mut() {
                        prev.push_str(s);
                        continue;
                    }
                }
                folded.push(piece);
            }
        }

        match folded.len() {
            0 => Token::Literal(String::new()),
            1 => folded.remove(0),
            _ => Token::Join(folded),
        }
    }

    /// The literal value, if this token is already resolved
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Token::Literal(s) => Some(s),
            _ => None,
        }
    }

    /// Logical ids of every node this token reads from
    pub fn referenced_logical_ids(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Token::Ref(id) | Token::Attr { logical_id: id, .. } | Token::Part { logical_id: id, .. } => {
                if !out.contains(&id.as_str()) {
                    out.push(id);
                }
            }
            Token::Join(parts) => parts.iter().for_each(|p| p.collect_refs(out)),
            Token::Literal(_) | Token::AccountId | Token::Region => {}
        }
    }

    /// Intrinsic JSON form understood by the provisioning backend
    pub fn to_json(&self) -> Value {
        match self {
            Token::Literal(s) => Value::String(s.clone()),
            Token::Ref(id) => json!({ "Ref": id }),
            Token::Attr { logical_id, attribute } => {
                json!({ "Fn::GetAtt": [logical_id, attribute] })
            }
            Token::Part { logical_id, part } => json!({
                "Fn::Select": [
                    part.index(),
                    { "Fn::Split": [COMPOSITE_SEPARATOR, { "Ref": logical_id }] }
                ]
            }),
            Token::Join(parts) => {
                let parts: Vec<Value> = parts.iter().map(Token::to_json).collect();
                json!({ "Fn::Join": ["", parts] })
            }
            Token::AccountId => json!({ "Ref": "AWS::AccountId" }),
            Token::Region => json!({ "Ref": "AWS::Region" }),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(s) => write!(f, "{}", s),
            Token::Ref(id) => write!(f, "${{{}}}", id),
            Token::Attr { logical_id, attribute } => write!(f, "${{{}.{}}}", logical_id, attribute),
            Token::Part { logical_id, part } => write!(f, "${{{}[{}]}}", logical_id, part.index()),
            Token::Join(parts) => parts.iter().try_for_each(|p| write!(f, "{}", p)),
            Token::AccountId => write!(f, "${{AWS::AccountId}}"),
            Token::Region => write!(f, "${{AWS::Region}}"),
        }
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl Default for Token {
    fn default() -> Self {
        Token::Literal(String::new())
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token::literal(value)
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Token::Literal(value)
    }
}

/// Identifier of a node whose primary id has the form `domainId|entityId`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeId {
    logical_id: String,
}

impl CompositeId {
    pub fn new(logical_id: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
        }
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn whole(&self) -> Token {
        Token::reference(&self.logical_id)
    }

    pub fn domain_part(&self) -> Token {
        Token::Part {
            logical_id: self.logical_id.clone(),
            part: CompositePart::Domain,
        }
    }

    pub fn entity_part(&self) -> Token {
        Token::Part {
            logical_id: self.logical_id.clone(),
            part: CompositePart::Entity,
        }
    }
}

/// IAM role named in configuration, addressed by ARN in the current account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRef {
    name: String,
    path: String,
}

impl RoleRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: "/".to_string(),
        }
    }

    /// Role living under the `service-role/` path
    pub fn service_role(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: "/service-role/".to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arn(&self) -> Token {
        Token::join([
            Token::literal("arn:aws:iam::"),
            Token::AccountId,
            Token::literal(format!(":role{}{}", self.path, self.name)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_folds_literals() {
        let t = Token::join([Token::literal("a"), Token::literal("b"), Token::literal("")]);
        assert_eq!(t, Token::literal("ab"));

        let t = Token::join([
            Token::literal("s3://"),
            Token::join([Token::literal("x-"), Token::AccountId]),
            Token::literal("/"),
        ]);
        assert_eq!(
            t,
            Token::Join(vec![Token::literal("s3://x-"), Token::AccountId, Token::literal("/")])
        );
    }

    #[test]
    fn test_referenced_logical_ids_deduplicates() {
        let unit = CompositeId::new("UnitA");
        let t = Token::join([unit.domain_part(), Token::literal(":"), unit.entity_part()]);
        assert_eq!(t.referenced_logical_ids(), vec!["UnitA"]);
        assert!(Token::AccountId.referenced_logical_ids().is_empty());
    }

    #[test]
    fn test_composite_part_json() {
        let v = CompositeId::new("Unit").entity_part().to_json();
        assert_eq!(v["Fn::Select"][0], 1);
        assert_eq!(v["Fn::Select"][1]["Fn::Split"][0], "|");
        assert_eq!(v["Fn::Select"][1]["Fn::Split"][1]["Ref"], "Unit");
    }

    #[test]
    fn test_role_arn() {
        let arn = RoleRef::service_role("Exec").arn();
        assert_eq!(arn.to_string(), "arn:aws:iam::${AWS::AccountId}:role/service-role/Exec");
        let arn = RoleRef::named("Glue").arn();
        assert_eq!(arn.to_string(), "arn:aws:iam::${AWS::AccountId}:role/Glue");
    }
}
