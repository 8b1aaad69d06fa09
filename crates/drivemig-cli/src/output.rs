//! Terminal output
//!
//! Human output goes to stdout with status markers; `--json` replaces it
//! with one pretty-printed JSON document per command. Logs always go to
//! stderr so the two never interleave.

/// Human or JSON, chosen by `--json`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }

    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Sink for everything a command prints
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    /// Section title followed by indented `info` lines
    fn heading(&self, title: &str);
    fn print_json(&self, value: &serde_json::Value);
}

/// Status markers on stdout, warnings and errors on stderr
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn heading(&self, title: &str) {
        println!();
        println!("{}", title);
    }
    fn print_json(&self, _value: &serde_json::Value) {
        // Structured output is JSON-only
    }
}

/// Emits each message as a JSON object
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, _message: &str) {}
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn warn(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"level": "warning", "message": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn heading(&self, _title: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}

/// Binary units with one decimal: `512 bytes`, `2.1 GB`
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format a duration in seconds as `1h 02m 03s`, `2m 05s` or `4.2s`
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        return format!("{:.1}s", secs.max(0.0));
    }
    let total = secs.round() as u64;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else {
        format!("{}m {:02}s", minutes, seconds)
    }
}

/// `"1 file"`, `"3 files"`
pub fn plural(count: u64, noun: &str) -> String {
    if count == 1 {
        format!("{} {}", count, noun)
    } else {
        format!("{} {}s", count, noun)
    }
}

/// Prints at most `limit` lines, then a `...and N more` line
pub fn print_capped<T>(
    formatter: &dyn OutputFormatter,
    items: &[T],
    limit: usize,
    render: impl Fn(&T) -> String,
) {
    for item in items.iter().take(limit) {
        formatter.info(&format!("  {}", render(item)));
    }
    if items.len() > limit {
        formatter.info(&format!("  ...and {} more", items.len() - limit));
    }
}
