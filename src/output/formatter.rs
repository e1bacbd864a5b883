//! Output formatters for match reports

use crate::error::{JobMatcherError, Result};
use crate::output::report::{MatchDocument, RankedJob};
use colored::{Color, Colorize};
use std::path::{Path, PathBuf};

const TOP_COMPANIES: usize = 5;
const TOP_LOCATIONS: usize = 5;
const CSV_COLUMNS: [&str; 7] = ["rank", "score", "title", "company", "location", "source", "url"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Console,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn parse(format: &str) -> Result<Self> {
        match format.to_lowercase().as_str() {
            "console" | "text" => Ok(OutputFormat::Console),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(JobMatcherError::Configuration(format!(
                "Invalid output format: {}. Supported: console, json, csv",
                format
            ))),
        }
    }
}

/// Trait for rendering a match document
pub trait OutputFormatter {
    fn format_report(&self, document: &MatchDocument) -> Result<String>;
    fn supports_format(&self) -> OutputFormat;
}

/// Console formatter with optional colors
pub struct ConsoleFormatter {
    use_colors: bool,
    detailed: bool,
}

/// JSON formatter
pub struct JsonFormatter {
    pretty: bool,
}

/// One row per ranked match
pub struct CsvFormatter;

impl ConsoleFormatter {
    pub fn new(use_colors: bool, detailed: bool) -> Self {
        Self { use_colors, detailed }
    }

    fn colorize(&self, text: &str, color: Color) -> String {
        if self.use_colors {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn format_header(&self, title: &str, level: u8) -> String {
        let (prefix, color) = match level {
            1 => ("█", Color::Blue),
            2 => ("▓", Color::Green),
            _ => ("▒", Color::Yellow),
        };

        if self.use_colors {
            format!("\n{} {}\n", prefix.color(color).bold(), title.color(color).bold())
        } else {
            format!("\n{} {}\n", prefix, title)
        }
    }

    fn format_score(&self, score: f32) -> String {
        let color = if score >= 0.75 {
            Color::Green
        } else if score >= 0.5 {
            Color::Yellow
        } else {
            Color::Red
        };
        self.colorize(&format!("{:.4}", score), color)
    }

    fn format_match(&self, job: &RankedJob) -> String {
        let title = job.title.as_deref().unwrap_or(&job.job_id);
        let mut line = format!(
            "{:>3}. {} {}",
            job.rank,
            self.format_score(job.score),
            self.colorize(title, Color::Cyan)
        );

        let details: Vec<&str> = [&job.company, &job.location, &job.source]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .collect();
        if !details.is_empty() {
            line.push_str(&format!(" ({})", details.join(" | ")));
        }
        line.push('\n');

        if self.detailed {
            line.push_str(&format!("       id: {}\n", job.job_id));
            if let Some(url) = &job.url {
                line.push_str(&format!("       {}\n", url));
            }
        }
        line
    }
}

impl OutputFormatter for ConsoleFormatter {
    fn format_report(&self, document: &MatchDocument) -> Result<String> {
        let run = &document.run;
        let mut output = String::new();

        output.push_str(&self.format_header("JOB MATCHES", 1));
        output.push_str(&format!(
            "Resume: {} | Model: {} ({} dims)\n",
            run.resume_id, run.model_id, run.dimension
        ));
        output.push_str(&format!(
            "Generated: {} | Processing time: {}ms\n",
            run.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            run.processing_time_ms
        ));

        output.push_str(&self.format_header("Top Matches", 2));
        if document.matches.is_empty() {
            output.push_str(&format!(
                "No jobs scored at or above {:.2}\n",
                run.min_score
            ));
        }
        for job in &document.matches {
            output.push_str(&self.format_match(job));
        }

        output.push_str(&self.format_header("Summary", 2));
        output.push_str(&format!(
            "Jobs: {} total, {} scored, {} below threshold, {} failed\n",
            run.jobs_total,
            run.jobs_considered,
            run.jobs_filtered,
            document.failures.len()
        ));
        output.push_str(&format!(
            "Cache: {} hits, {} misses, {} pruned\n",
            run.cache_hits, run.cache_misses, run.cache_pruned
        ));

        if let Some(scores) = &document.summary.scores {
            output.push_str(&format!(
                "Scores: highest {} | lowest {} | average {}\n",
                self.format_score(scores.highest),
                self.format_score(scores.lowest),
                self.format_score(scores.average)
            ));
        }

        if !document.summary.by_company.is_empty() {
            output.push_str(&self.format_header("Top Companies", 3));
            for (company, count) in document.summary.by_company.iter().take(TOP_COMPANIES) {
                output.push_str(&format!("  {}: {}\n", company, count));
            }
        }

        if !document.summary.by_location.is_empty() {
            output.push_str(&self.format_header("Top Locations", 3));
            for (location, count) in document.summary.by_location.iter().take(TOP_LOCATIONS) {
                output.push_str(&format!("  {}: {}\n", location, count));
            }
        }

        if !document.summary.by_source.is_empty() {
            output.push_str(&self.format_header("Sources", 3));
            for (source, count) in &document.summary.by_source {
                output.push_str(&format!("  {}: {}\n", source, count));
            }
        }

        if !document.failures.is_empty() {
            output.push_str(&self.format_header("Skipped Jobs", 3));
            for failure in &document.failures {
                let line = if self.detailed {
                    format!("  {} [{}]: {}\n", failure.id, failure.kind, failure.message)
                } else {
                    format!("  {} [{}]\n", failure.id, failure.kind)
                };
                output.push_str(&self.colorize(&line, Color::Red));
            }
        }

        Ok(output)
    }

    fn supports_format(&self) -> OutputFormat {
        OutputFormat::Console
    }
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_report(&self, document: &MatchDocument) -> Result<String> {
        if self.pretty {
            Ok(serde_json::to_string_pretty(document)?)
        } else {
            Ok(serde_json::to_string(document)?)
        }
    }

    fn supports_format(&self) -> OutputFormat {
        OutputFormat::Json
    }
}

/// Quote a field when it holds a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl OutputFormatter for CsvFormatter {
    fn format_report(&self, document: &MatchDocument) -> Result<String> {
        let mut output = CSV_COLUMNS.join(",");
        output.push('\n');

        for job in &document.matches {
            let row = [
                job.rank.to_string(),
                format!("{:.6}", job.score),
                job.title.clone().unwrap_or_default(),
                job.company.clone().unwrap_or_default(),
                job.location.clone().unwrap_or_default(),
                job.source.clone().unwrap_or_default(),
                job.url.clone().unwrap_or_default(),
            ];
            let fields: Vec<String> = row.iter().map(|field| csv_field(field)).collect();
            output.push_str(&fields.join(","));
            output.push('\n');
        }

        Ok(output)
    }

    fn supports_format(&self) -> OutputFormat {
        OutputFormat::Csv
    }
}

pub fn formatter_for(format: OutputFormat, use_colors: bool, detailed: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Console => Box::new(ConsoleFormatter::new(use_colors, detailed)),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

pub fn save_report(content: &str, file_path: &Path) -> Result<()> {
    if let Some(parent) = file_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(file_path, content)?;
    Ok(())
}

/// Write the CSV rows next to a saved JSON report, same name with a `.csv` extension.
pub fn save_csv_companion(document: &MatchDocument, json_path: &Path) -> Result<PathBuf> {
    let csv_path = json_path.with_extension("csv");
    save_report(&CsvFormatter.format_report(document)?, &csv_path)?;
    Ok(csv_path)
}

pub fn suggest_filename(format: OutputFormat, resume_id: &str) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    match format {
        OutputFormat::Console => format!("{}_matches_{}.txt", resume_id, timestamp),
        OutputFormat::Json => format!("{}_matches_{}.json", resume_id, timestamp),
        OutputFormat::Csv => format!("{}_matches_{}.csv", resume_id, timestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::record::TextRecord;
    use crate::output::report::tests::{sample_jobs, sample_report};
    use tempfile::TempDir;

    fn document() -> MatchDocument {
        let resume = TextRecord::resume("resume-cv", "text");
        MatchDocument::build(&sample_report(), &resume, &sample_jobs())
    }

    #[test]
    fn test_parse_output_format() {
        assert_eq!(OutputFormat::parse("JSON").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("console").unwrap(), OutputFormat::Console);
        assert_eq!(OutputFormat::parse("csv").unwrap(), OutputFormat::Csv);
        assert!(OutputFormat::parse("pdf").is_err());
    }

    #[test]
    fn test_console_lists_matches_in_rank_order() {
        let output = ConsoleFormatter::new(false, false).format_report(&document()).unwrap();

        let first = output.find("Rust Engineer").unwrap();
        let second = output.find("Platform Engineer").unwrap();
        let third = output.find("Data Analyst").unwrap();
        assert!(first < second && second < third);
        assert!(output.contains("0.9000"));
        assert!(output.contains("Acme: 2"));
        assert!(output.contains("Top Locations"));
        assert!(output.contains("Remote: 1"));
        assert!(output.contains("highest 0.9000"));
        assert!(output.contains("d [invalid_input]"));
    }

    #[test]
    fn test_console_empty_result() {
        let mut report = sample_report();
        report.results.clear();
        report.min_score = 0.8;
        let resume = TextRecord::resume("resume-cv", "text");
        let document = MatchDocument::build(&report, &resume, &sample_jobs());

        let output = ConsoleFormatter::new(false, false).format_report(&document).unwrap();
        assert!(output.contains("No jobs scored at or above 0.80"));
        assert!(!output.contains("highest"));
    }

    #[test]
    fn test_json_output_parses_back() {
        let output = JsonFormatter::new(true).format_report(&document()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["matches"][0]["job_id"], "a");
        assert_eq!(value["matches"][0]["rank"], 1);
        assert_eq!(value["run"]["resume_id"], "resume-cv");
        assert_eq!(value["failures"][0]["kind"], "invalid_input");
    }

    #[test]
    fn test_csv_rows_follow_rank_order() {
        let mut document = document();
        document.matches[1].title = Some("Platform Engineer, \"SRE\"".to_string());
        let output = CsvFormatter.format_report(&document).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], "rank,score,title,company,location,source,url");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "1,0.900000,Rust Engineer,Acme,,linkedin,");
        assert_eq!(lines[2], "2,0.600000,\"Platform Engineer, \"\"SRE\"\"\",Acme,Remote,,");
        assert!(lines[3].starts_with("3,0.300000,Data Analyst,Globex"));
    }

    #[test]
    fn test_csv_companion_written_next_to_json() {
        let temp_dir = TempDir::new().unwrap();
        let json_path = temp_dir.path().join("top_jobs.json");
        save_report("{}", &json_path).unwrap();

        let csv_path = save_csv_companion(&document(), &json_path).unwrap();
        assert_eq!(csv_path, temp_dir.path().join("top_jobs.csv"));
        let content = std::fs::read_to_string(&csv_path).unwrap();
        assert!(content.starts_with("rank,score,title"));
        assert_eq!(content.lines().count(), 4);
    }

    #[test]
    fn test_save_report_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reports").join("out.json");
        save_report("{}", &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_formatter_for_matches_format() {
        assert_eq!(formatter_for(OutputFormat::Json, false, false).supports_format(), OutputFormat::Json);
        assert_eq!(
            formatter_for(OutputFormat::Console, false, false).supports_format(),
            OutputFormat::Console
        );
    }
}
