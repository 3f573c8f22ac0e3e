use crate::worker::WorkerStatus;
use once_cell::sync::Lazy;
use regex::Regex;

/// Characters permitted inside a prompt pattern that gets interpolated into
/// the probe script's `grep -qE` expression. Anything outside this set could
/// break out of the quoted expression, so the pattern is dropped instead.
static SAFE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9 /\\_\-\.\?\*\+\|\[\]\(\)\^]+$").expect("allowlist regex is valid")
});

/// Grep alternative that can never match a captured pane line. Substituted
/// when every configured pattern fails the allowlist.
const NEVER_MATCH: &str = "^$NEVER_MATCH";

fn safe_pattern(pattern: &str) -> Option<&str> {
    if pattern.is_empty() || !SAFE_PATTERN.is_match(pattern) {
        return None;
    }
    Some(pattern)
}

/// Assembles the shell snippet executed inside a worker to detect the state
/// of its coding agent. Prompt patterns failing the allowlist are silently
/// dropped; the script never embeds an unvalidated pattern.
pub fn build_probe_script(patterns: &[String]) -> String {
    let escaped: Vec<&str> = patterns
        .iter()
        .filter_map(|p| safe_pattern(p))
        .collect();

    let pattern_expr = if escaped.is_empty() {
        NEVER_MATCH.to_string()
    } else {
        escaped.join("|")
    };

    format!(
        r#"if pgrep -a claude > /dev/null 2>&1; then
  RECENT=$(tmux capture-pane -p -l 5 2>/dev/null || echo "")
  if echo "$RECENT" | grep -qE "({pattern_expr})"; then
    echo "WAITING"
  else
    echo "WORKING"
  fi
else
  EXIT=$(tmux show-environment CLAUDE_EXIT 2>/dev/null | cut -d= -f2 || echo "")
  if [ "$EXIT" = "0" ] || [ -z "$EXIT" ]; then
    echo "FINISHED"
  else
    echo "ERROR:$EXIT"
  fi
fi"#
    )
}

/// Classifies raw probe stdout into a canonical state and optional detail.
/// Total and pure: anything unrecognized (empty, garbage, multi-line) maps to
/// `SLEEPING` — an unparseable result means "probably not an active agent",
/// not a failure.
pub fn classify_output(output: &str) -> (WorkerStatus, String) {
    let output = output.trim();
    match output {
        "WORKING" => (WorkerStatus::Working, String::new()),
        "WAITING" => (WorkerStatus::Waiting, String::new()),
        "FINISHED" => (WorkerStatus::Finished, String::new()),
        _ => match output.strip_prefix("ERROR:") {
            Some(code) => (WorkerStatus::Error, code.to_string()),
            None => (WorkerStatus::Sleeping, String::new()),
        },
    }
}
