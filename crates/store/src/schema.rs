pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
  key BLOB PRIMARY KEY,
  value BLOB NOT NULL,
  version BIGINT NOT NULL,
  expires_at BIGINT
);

CREATE SEQUENCE IF NOT EXISTS kv_version_seq;
"#;
