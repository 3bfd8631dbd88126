// Spans and traces carry no primary key: re-submitting a trace deletes and
// re-inserts its rows inside one transaction.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  api_key TEXT NOT NULL,
  created_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS traces (
  id TEXT NOT NULL,
  project_id TEXT NOT NULL,
  name TEXT NOT NULL,
  start_time TIMESTAMP NOT NULL,
  end_time TIMESTAMP,
  duration_ms BIGINT,
  status TEXT NOT NULL,
  error_message TEXT,
  metadata_json TEXT,
  span_count BIGINT NOT NULL,
  total_tokens BIGINT,
  total_cost_usd DOUBLE,
  created_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS spans (
  id TEXT NOT NULL,
  trace_id TEXT NOT NULL,
  parent_span_id TEXT,
  name TEXT NOT NULL,
  span_type TEXT NOT NULL,
  start_time TIMESTAMP NOT NULL,
  end_time TIMESTAMP,
  duration_ms BIGINT,
  model TEXT,
  input_tokens BIGINT,
  output_tokens BIGINT,
  cost_usd DOUBLE,
  input_json TEXT,
  output_json TEXT,
  status TEXT NOT NULL,
  error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_traces_id ON traces(id);
CREATE INDEX IF NOT EXISTS idx_traces_project_created ON traces(project_id, created_at);
CREATE INDEX IF NOT EXISTS idx_spans_trace ON spans(trace_id);
CREATE INDEX IF NOT EXISTS idx_spans_model ON spans(span_type, model);
"#;
