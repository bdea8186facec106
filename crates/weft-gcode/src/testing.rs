/// Convenience helper for snapshotting parser output as pretty JSON.
pub fn snapshot_from_str(input: &str) -> String {
    match crate::parse(input) {
        Ok(statements) => serde_json::to_string_pretty(&statements)
            .unwrap_or_else(|err| format!("failed to render JSON: {err}")),
        Err(err) => format!("lex error: {err}"),
    }
}
