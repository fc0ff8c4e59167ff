//! Lake Formation data-location registration, permissions and settings

use serde_json::json;

use crate::error::GraphError;
use crate::graph::{NodeId, ResourceGraph, ResourceKind, Token};

fn s3_arn(bucket_name: Token) -> Token {
    Token::join([Token::literal("arn:aws:s3:::"), bucket_name])
}

/// Register a bucket as a governed data location under `role_arn`
pub fn create_data_location(
    graph: &mut ResourceGraph,
    name: &str,
    bucket_name: Token,
    role_arn: Token,
) -> Result<NodeId, GraphError> {
    graph.add(
        format!("DataLocation-{}", name),
        ResourceKind::DataLocationResource,
        &json!({
            "ResourceArn": s3_arn(bucket_name),
            "RoleArn": role_arn,
            "UseServiceLinkedRole": false,
            "HybridAccessEnabled": false,
            "WithFederation": false,
        }),
    )
}

/// Grant `DATA_LOCATION_ACCESS` on a bucket to a principal
pub fn create_data_location_permission(
    graph: &mut ResourceGraph,
    name: &str,
    principal_arn: Token,
    bucket_name: Token,
) -> Result<NodeId, GraphError> {
    graph.add(
        format!("DataLocationPermission-{}", name),
        ResourceKind::DataLocationPermission,
        &json!({
            "Principal": { "DataLakePrincipalIdentifier": principal_arn },
            "Resource": {
                "DataLocation": {
                    "CatalogId": Token::AccountId,
                    "ResourceArn": s3_arn(bucket_name),
                }
            },
            "Permissions": ["DATA_LOCATION_ACCESS"],
            "PermissionsWithGrantOption": [],
        }),
    )
}

/// Data-lake administrators
pub fn create_data_lake_settings(
    graph: &mut ResourceGraph,
    admins: &[Token],
) -> Result<NodeId, GraphError> {
    let admins: Vec<_> = admins
        .iter()
        .map(|arn| json!({ "DataLakePrincipalIdentifier": arn }))
        .collect();
    graph.add(
        "DataLakeSettings",
        ResourceKind::DataLakeSettings,
        &json!({ "Admins": admins }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_targets_bucket_arn() {
        let mut g = ResourceGraph::new();
        let node = create_data_location_permission(
            &mut g,
            "target-x",
            Token::literal("role-arn"),
            Token::reference("Bucket-target-x"),
        )
        .unwrap();
        let resource_arn = g[node].property("/Resource/DataLocation/ResourceArn").unwrap();
        assert_eq!(resource_arn["Fn::Join"][1][0], json!("arn:aws:s3:::"));
        assert_eq!(resource_arn["Fn::Join"][1][1], json!({"Ref": "Bucket-target-x"}));
    }
}
