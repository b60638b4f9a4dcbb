mod config_file_tests;
mod model_loading_tests;
mod query_json_tests;
