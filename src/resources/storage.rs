//! Storage buckets

use std::collections::BTreeMap;

use govgraph_types::{BucketConfig, BucketPurpose, RemovalPolicy};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::GraphError;
use crate::graph::{NodeId, ResourceGraph, ResourceKind, Token};

/// A declared bucket
#[derive(Debug, Clone)]
pub struct BucketHandle {
    pub node: NodeId,
    /// Configured (logical) name
    pub name: String,
    pub logical_id: String,
    pub purpose: Option<BucketPurpose>,
}

impl BucketHandle {
    /// Physical bucket name
    pub fn bucket_name(&self) -> Token {
        Token::reference(&self.logical_id)
    }

    pub fn bucket_arn(&self) -> Token {
        Token::attr(&self.logical_id, "Arn")
    }
}

/// Physical name of a bucket: `<name>-<account>-<region>`
pub fn physical_bucket_name(name: &str) -> Token {
    Token::join([
        Token::literal(format!("{}-", name)),
        Token::AccountId,
        Token::literal("-"),
        Token::Region,
    ])
}

/// Logical id for a bucket name
pub fn bucket_logical_id(name: &str) -> String {
    format!("Bucket-{}", name)
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BucketProperties {
    bucket_name: Token,
    bucket_encryption: Value,
    public_access_block_configuration: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    lifecycle_configuration: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_configuration: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<Value>,
}

/// Declare a bucket, plus an SSL-only bucket policy when `enforceSSL` is set
pub fn create_bucket(
    graph: &mut ResourceGraph,
    name: &str,
    config: &BucketConfig,
) -> Result<BucketHandle, GraphError> {
    let logical_id = bucket_logical_id(name);

    let algorithm = match config.encryption.as_deref() {
        Some("KMS") | Some("kms") | Some("aws:kms") => "aws:kms",
        _ => "AES256",
    };
    let auto_delete = config.auto_delete_objects.unwrap_or(false);

    let properties = BucketProperties {
        bucket_name: physical_bucket_name(name),
        bucket_encryption: json!({
            "ServerSideEncryptionConfiguration": [
                { "ServerSideEncryptionByDefault": { "SSEAlgorithm": algorithm } }
            ]
        }),
        public_access_block_configuration: json!({
            "BlockPublicAcls": true,
            "BlockPublicPolicy": true,
            "IgnorePublicAcls": true,
            "RestrictPublicBuckets": true,
        }),
        lifecycle_configuration: config.expiration_days.map(|days| {
            json!({
                "Rules": [
                    { "Id": "delete-old-files", "Status": "Enabled", "ExpirationInDays": days }
                ]
            })
        }),
        notification_configuration: config
            .event_bridge_enabled
            .filter(|enabled| *enabled)
            .map(|_| json!({ "EventBridgeConfiguration": { "EventBridgeEnabled": true } })),
        tags: auto_delete_tags(auto_delete),
    };

    let node = graph.add(&logical_id, ResourceKind::Bucket, &properties)?;
    graph.set_deletion_policy(node, config.removal_policy.unwrap_or(RemovalPolicy::Retain))?;

    if config.enforce_ssl.unwrap_or(false) {
        let bucket_arn = Token::attr(&logical_id, "Arn");
        let policy = json!({
            "Bucket": Token::reference(&logical_id),
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Deny",
                    "Principal": { "AWS": "*" },
                    "Action": "s3:*",
                    "Resource": [bucket_arn.clone(), Token::join([bucket_arn, Token::literal("/*")])],
                    "Condition": { "Bool": { "aws:SecureTransport": "false" } }
                }]
            }
        });
        let policy_node = graph.add(
            format!("{}-Policy", logical_id),
            ResourceKind::BucketPolicy,
            &policy,
        )?;
        graph.add_dependency(policy_node, node)?;
    }

    Ok(BucketHandle {
        node,
        name: name.to_string(),
        logical_id,
        purpose: config.purpose,
    })
}

/// Tags a bucket whose objects are removed together with the bucket
pub(crate) fn auto_delete_tags(enabled: bool) -> Vec<Value> {
    if enabled {
        vec![json!({ "Key": "govgraph:auto-delete-objects", "Value": "true" })]
    } else {
        vec![]
    }
}

/// Buckets declared in this run, by configured name
#[derive(Debug, Clone, Default)]
pub struct BucketTable {
    buckets: BTreeMap<String, BucketHandle>,
}

impl BucketTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: BucketHandle) {
        self.buckets.insert(handle.name.clone(), handle);
    }

    pub fn get(&self, name: &str) -> Option<&BucketHandle> {
        self.buckets.get(name)
    }

    /// First bucket (by name) declared with the given purpose
    pub fn by_purpose(&self, purpose: BucketPurpose) -> Option<&BucketHandle> {
        self.buckets.values().find(|b| b.purpose == Some(purpose))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_with_ssl_policy() {
        let mut g = ResourceGraph::new();
        let config = BucketConfig {
            enforce_ssl: Some(true),
            removal_policy: Some(RemovalPolicy::Destroy),
            auto_delete_objects: Some(true),
            expiration_days: Some(30),
            ..Default::default()
        };
        let bucket = create_bucket(&mut g, "source-orders", &config).unwrap();

        assert_eq!(g.len(), 2);
        let node = &g[bucket.node];
        assert_eq!(node.deletion_policy(), Some(RemovalPolicy::Destroy));
        assert_eq!(
            node.property("/LifecycleConfiguration/Rules/0/ExpirationInDays"),
            Some(&json!(30))
        );
        assert_eq!(
            node.property("/BucketName/Fn::Join/1/0"),
            Some(&json!("source-orders-"))
        );

        let policy = g.lookup("Bucket-source-orders-Policy").unwrap();
        assert!(g.has_edge(policy, bucket.node));
    }

    #[test]
    fn test_physical_name_rendering() {
        assert_eq!(
            physical_bucket_name("source-orders").to_string(),
            "source-orders-${AWS::AccountId}-${AWS::Region}"
        );
    }

    #[test]
    fn test_table_by_purpose() {
        let mut g = ResourceGraph::new();
        let mut table = BucketTable::new();
        let config = BucketConfig {
            purpose: Some(BucketPurpose::Blueprint),
            ..Default::default()
        };
        table.insert(create_bucket(&mut g, "blueprints", &config).unwrap());
        table.insert(create_bucket(&mut g, "other", &BucketConfig::default()).unwrap());

        assert_eq!(table.by_purpose(BucketPurpose::Blueprint).unwrap().name, "blueprints");
        assert!(table.by_purpose(BucketPurpose::SqlAssets).is_none());
    }
}
