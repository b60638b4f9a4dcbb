//! Unit tests for loading entity models from YAML
//!
//! Covers navigation generation from relationship definitions and the
//! structural validation errors reported for malformed models.

#[cfg(test)]
mod model_loading_tests {
    use std::io::Write;

    use navexpand::model::{EntityModel, ModelError, ScalarType};

    const BLOG: &str = r#"
entities:
  - name: Blog
    key: [Id]
    properties:
      - { name: Id, type: int32 }
      - { name: Title, type: string }
      - { name: Archived, type: bool }
      - { name: TenantId, type: int32 }
    query_filter: "b => !b.Archived && b.TenantId == @tenant"
  - name: Post
    key: [Id]
    properties:
      - { name: Id, type: int32 }
      - { name: BlogId, type: int32, nullable: true }
      - { name: Body, type: string }
relationships:
  - principal: Blog
    dependent: Post
    foreign_key: [BlogId]
    required: false
    dependent_to_principal: Blog
    principal_to_dependent: Posts
"#;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", BLOG).unwrap();

        let model = EntityModel::from_yaml_file(file.path()).unwrap();

        let blog = model.entity("Blog").unwrap();
        assert_eq!(blog.primary_key, vec!["Id".to_string()]);
        assert!(blog.query_filter.is_some());
        assert_eq!(
            model.property("Post", "BlogId").unwrap().data_type,
            ScalarType::Int32
        );
        assert!(model.property("Post", "BlogId").unwrap().nullable);
    }

    #[test]
    fn test_relationship_yields_both_navigations() {
        let model = EntityModel::from_yaml_str(BLOG).unwrap();

        let blog = model.navigation("Post", "Blog").unwrap();
        assert!(!blog.is_collection);
        assert!(blog.is_on_dependent);
        assert!(!blog.is_required_dependent_to_principal());
        assert_eq!(blog.outer_key_properties(), ["BlogId".to_string()]);
        assert_eq!(blog.inner_key_properties(), ["Id".to_string()]);

        let posts = model.navigation("Blog", "Posts").unwrap();
        assert!(posts.is_collection);
        assert!(!posts.is_on_dependent);
        assert_eq!(posts.outer_key_properties(), ["Id".to_string()]);
        assert_eq!(posts.inner_key_properties(), ["BlogId".to_string()]);
    }

    #[test]
    fn test_unknown_lookups() {
        let model = EntityModel::from_yaml_str(BLOG).unwrap();

        assert_eq!(model.entity("Comment").unwrap_err(), ModelError::entity("Comment"));
        assert!(model.navigation("Blog", "Comments").is_none());
        assert!(matches!(
            model.property("Post", "Slug"),
            Err(ModelError::Property { .. })
        ));
    }

    #[test]
    fn test_malformed_models_are_rejected() {
        let cases = vec![
            ("entities: []", "empty model"),
            ("entities: [ { name: A, key: [Id], properties: [] } ]", "key without property"),
            ("not: [valid", "broken yaml"),
        ];

        for (yaml, case) in cases {
            assert!(EntityModel::from_yaml_str(yaml).is_err(), "Accepted {}", case);
        }
    }

    #[test]
    fn test_relationship_to_unknown_entity() {
        let yaml = BLOG.replace("principal: Blog", "principal: Site");

        let error = EntityModel::from_yaml_str(&yaml).unwrap_err();
        assert_eq!(error, ModelError::entity("Site"));
    }

    #[test]
    fn test_missing_file() {
        let result = EntityModel::from_yaml_file("/nonexistent/model.yaml");
        assert!(matches!(result, Err(ModelError::ConfigReadError { .. })));
    }
}
