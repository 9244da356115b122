use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "aeocheck")]
#[command(
    about = "Measures how visible a company website is to AI assistants",
    long_about = None
)]
pub struct Cli {
    /// The company website to analyze (scheme optional)
    #[arg(value_name = "URL")]
    pub url: String,

    /// Owner id recorded on the job and charged for it
    #[arg(long, default_value = "local")]
    pub owner: String,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    pub output: String,

    /// Save the report as JSON to this file
    #[arg(short, long)]
    pub save: Option<String>,

    /// Print the redacted view a viewer without access would see
    #[arg(long)]
    pub redacted: bool,

    /// Path to configuration file (JSON, TOML, or YAML)
    #[arg(long)]
    pub config: Option<String>,

    /// Retries per fetch and per provider call
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Request timeout in seconds for the target site
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Verbose output (debug logging)
    #[arg(short, long)]
    pub verbose: bool,

    /// Do not draw the progress bar
    #[arg(long)]
    pub no_progress: bool,
}
