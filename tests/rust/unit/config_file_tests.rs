//! Unit tests for loading expansion settings from YAML files

#[cfg(test)]
mod config_file_tests {
    use std::io::Write;

    use navexpand::config::{ConfigError, ExpansionConfig};

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_full_config_file() {
        let file = config_file(
            "ignore_query_filters: true\nmax_expansion_depth: 64\nlog_expanded_tree: true\n",
        );

        let config = ExpansionConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(
            config,
            ExpansionConfig {
                ignore_query_filters: true,
                max_expansion_depth: 64,
                log_expanded_tree: true,
            }
        );
    }

    #[test]
    fn test_out_of_range_depth_in_file() {
        let file = config_file("max_expansion_depth: 1024\n");

        let result = ExpansionConfig::from_yaml_file(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_malformed_config_file() {
        let file = config_file("max_expansion_depth: [deep\n");

        match ExpansionConfig::from_yaml_file(file.path()) {
            Err(ConfigError::Parse { field, .. }) => assert_eq!(field, "yaml_content"),
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_config_file() {
        let result = ExpansionConfig::from_yaml_file("/nonexistent/navexpand.yaml");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
