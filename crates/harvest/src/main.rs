use std::fs::{self, File};
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use harvest::writer::{to_json_bytes, write_json, JsonStyle};
use harvest::{batch_run_config, run_batch, BatchPaths};
use harvest_crawler::{
    BatchCrawler, CrawlResult, CrawlerRunConfig, ExtractionStrategy, PageLocation, Throttle,
    WebCrawler,
};
use harvest_extract::{
    generate_schema, ExtraArgs, JsonCssExtractionStrategy, LlmClient, LlmConfig,
    LlmExtractionStrategy,
};
use serde_json::Value;
use tokio::runtime;

const DEFAULT_LOG_FILTER: &str = "harvest=info,harvest_crawler=warn,harvest_extract=warn";

/// Batch web content extractor
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[command(name = "batch")]
    Batch(BatchArgs),
    #[command(name = "scrap")]
    Scrap(ScrapArgs),
    #[command(name = "llm")]
    Llm(LlmArgs),
    #[command(name = "schema")]
    Schema(SchemaArgs),
    #[command(hide = true)]
    Completion,
}

/// Extract every link of a links file with a CSS schema
///
/// Exits with an error only when the inputs can't be loaded or the output
/// directory can't be created. Failed links are listed in the printed summary.
#[derive(Debug, clap::Args)]
pub struct BatchArgs {
    /// Path to the CSS extraction schema
    #[arg(long, short, default_value = "schema.json")]
    pub schema: PathBuf,
    /// Path to the JSON array of `{"url": ...}` objects
    #[arg(long, short, default_value = "links.json")]
    pub links: PathBuf,
    /// Directory receiving one `test<index>.json` per extracted link
    #[arg(long, short, default_value = ".")]
    pub output_dir: PathBuf,
    /// Optional default crawler yaml configuration file
    #[arg(env = "HARVEST_CRAWLER_CONFIG", long)]
    pub crawler_config: Option<PathBuf>,
    /// Override crawler's user agent
    #[arg(long)]
    pub user_agent: Option<String>,
    /// Override crawler's maximum concurrent page downloads
    #[arg(long)]
    pub concurrency: Option<NonZeroUsize>,
    /// Override crawler's page timeout, in milliseconds
    #[arg(long)]
    pub page_timeout: Option<u64>,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

impl TryFrom<&BatchArgs> for CrawlerRunConfig {
    type Error = anyhow::Error;

    fn try_from(args: &BatchArgs) -> Result<Self, Self::Error> {
        let mut conf = if let Some(file) = args.crawler_config.as_ref().map(File::open) {
            serde_yaml::from_reader(file?)?
        } else {
            CrawlerRunConfig::default()
        };
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(concurrency) = args.concurrency {
            conf.throttle = Throttle::Concurrent(concurrency);
        }
        if let Some(page_timeout) = args.page_timeout {
            conf.page_timeout = page_timeout;
        }
        Ok(conf)
    }
}

pub fn batch(args: BatchArgs) -> anyhow::Result<()> {
    let config = CrawlerRunConfig::try_from(&args)?;
    let paths = BatchPaths {
        schema_path: args.schema,
        links_path: args.links,
        output_dir: args.output_dir,
    };
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let summary = rt.block_on(async {
        let crawler = WebCrawler::new()?;
        anyhow::Ok(run_batch(&crawler, &paths, &config).await?)
    })?;
    println!("{summary}");
    Ok(())
}

/// Extract a single page with a CSS schema and print the result
#[derive(Debug, clap::Args)]
#[command(group = clap::ArgGroup::new("page").required(true))]
pub struct ScrapArgs {
    /// Path to the CSS extraction schema
    #[arg(long, short, default_value = "schema.json")]
    pub schema: PathBuf,
    /// A local html page to extract
    #[arg(group = "page", long)]
    pub file: Option<PathBuf>,
    /// A distant html page to extract
    #[arg(group = "page", long)]
    pub url: Option<String>,
    /// Custom user agent to download the page
    #[arg(long, conflicts_with = "file")]
    pub ua: Option<String>,
    /// Write the result to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

pub fn scrap(args: ScrapArgs) -> anyhow::Result<()> {
    let schema: Value = serde_json::from_str(&fs::read_to_string(&args.schema)?)?;
    let strategy = JsonCssExtractionStrategy::new(schema)?;

    let extracted = if let Some(url) = args.url {
        let mut config = CrawlerRunConfig::default();
        if let Some(ua) = args.ua {
            config.user_agent = ua;
        }
        let config = batch_run_config(&config);
        let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
        let result = rt.block_on(async {
            let crawler = WebCrawler::new()?;
            anyhow::Ok(crawler.crawl(&url, &config, &strategy).await)
        })?;
        extracted_value(result)?
    } else if let Some(path) = args.file {
        let page = fs::read_to_string(&path)?;
        let location = PageLocation::Path(path);
        let rt = runtime::Builder::new_current_thread().build()?;
        rt.block_on(strategy.extract(&page, &location))?
    } else {
        anyhow::bail!("Missing `url` or `file`");
    };

    emit(&extracted, args.output)
}

/// Extract a single page with a language model
#[derive(Debug, clap::Args)]
pub struct LlmArgs {
    /// The page to extract
    #[arg(long)]
    pub url: String,
    /// What to extract from the page
    #[arg(long, short)]
    pub instruction: String,
    /// Optional JSON schema the extracted items must follow
    #[arg(long, short)]
    pub schema: Option<PathBuf>,
    /// Write the result to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    /// Maximum number of characters of page text sent to the model
    #[arg(long, default_value_t = 60_000)]
    pub max_content_chars: usize,
    #[command(flatten)]
    pub llm: LlmOpts,
}

pub fn llm(args: LlmArgs) -> anyhow::Result<()> {
    let mut strategy = LlmExtractionStrategy::new(&args.llm.config(), args.instruction)?
        .with_extra_args(args.llm.extra_args())
        .with_max_content_chars(args.max_content_chars);
    if let Some(path) = &args.schema {
        strategy = strategy.with_schema(serde_json::from_str(&fs::read_to_string(path)?)?);
    }

    let config = batch_run_config(&CrawlerRunConfig::default());
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = rt.block_on(async {
        let crawler = WebCrawler::new()?;
        anyhow::Ok(crawler.crawl(&args.url, &config, &strategy).await)
    })?;

    emit(&extracted_value(result)?, args.output)
}

/// Generate a CSS extraction schema from a sample page with a language model
#[derive(Debug, clap::Args)]
pub struct SchemaArgs {
    /// A local html page representative of the pages to extract
    #[arg(long)]
    pub sample: PathBuf,
    /// What the schema should extract
    #[arg(long, short)]
    pub query: Option<String>,
    /// Path of the generated schema
    #[arg(long, short, default_value = "schema.json")]
    pub output: PathBuf,
    #[command(flatten)]
    pub llm: LlmOpts,
}

pub fn schema(args: SchemaArgs) -> anyhow::Result<()> {
    let sample = fs::read_to_string(&args.sample)?;
    let client = LlmClient::new(&args.llm.config())?;
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let schema = rt.block_on(generate_schema(
        &client,
        &sample,
        args.query.as_deref(),
        &args.llm.extra_args(),
    ))?;
    write_json(&args.output, &schema, JsonStyle::Pretty(2))?;
    log::info!("Schema written to {}", args.output.display());
    Ok(())
}

#[derive(Debug, clap::Args)]
pub struct LlmOpts {
    /// Model to use, as `<vendor>/<model>`
    #[arg(long, default_value = "openai/gpt-4o")]
    pub provider: String,
    /// API token of the provider
    #[arg(env = "OPENAI_API_KEY", long, hide_env_values = true)]
    pub api_token: Option<String>,
    /// Override the provider's API base url
    #[arg(long)]
    pub base_url: Option<String>,
    #[arg(long, default_value_t = 0.0)]
    pub temperature: f32,
    #[arg(long, default_value_t = 0.9)]
    pub top_p: f32,
    #[arg(long, default_value_t = 2000)]
    pub max_tokens: u32,
}

impl LlmOpts {
    fn config(&self) -> LlmConfig {
        LlmConfig {
            provider: self.provider.clone(),
            api_token: self.api_token.clone(),
            base_url: self.base_url.clone(),
        }
    }

    fn extra_args(&self) -> ExtraArgs {
        ExtraArgs {
            temperature: Some(self.temperature),
            top_p: Some(self.top_p),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

fn extracted_value(result: CrawlResult) -> anyhow::Result<Value> {
    if !result.success {
        anyhow::bail!(
            "Couldn't extract {}: {}",
            result.url,
            result.error_message.unwrap_or_default()
        );
    }
    match result.extracted_content {
        Some(content) => Ok(serde_json::from_str(&content)?),
        None => Ok(Value::Null),
    }
}

fn emit(value: &Value, output: Option<PathBuf>) -> anyhow::Result<()> {
    match output {
        Some(path) => write_json(&path, value, JsonStyle::Pretty(4))?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&to_json_bytes(value, JsonStyle::Pretty(2))?)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn init_logs() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_LOG_FILTER))
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Batch(args) => {
            if !args.quiet {
                init_logs();
            }
            batch(args)
        }
        SubCommand::Scrap(args) => {
            init_logs();
            scrap(args)
        }
        SubCommand::Llm(args) => {
            init_logs();
            llm(args)
        }
        SubCommand::Schema(args) => {
            init_logs();
            schema(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "harvest", &mut io::stdout());
            Ok(())
        }
    }
}
