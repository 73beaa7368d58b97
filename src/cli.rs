//! Command-line surface and dispatch

use crate::config::Config;
use crate::error::{GgufError, GgufResult};
use crate::health::HttpHealthProbe;
use crate::models::{HfHubDownloader, HttpHubClient, ModelManager, PullOutcome, RemoteSort};
use crate::process::{SystemInspector, SystemLauncher};
use crate::proxy::{Proxy, ServerClient, commands};
use crate::render;
use crate::store::Store;
use crate::supervisor::{KillReport, Supervisor, SupervisorSettings};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "gguf")]
#[command(about = "Manage local GGUF models and the llama-server that serves them", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Download a new model from Hugging Face
    Pull {
        /// Repository id, e.g. TheBloke/Mistral-7B-Instruct-v0.2-GGUF
        model_id: String,
    },
    /// List local models
    Ls,
    /// Remove a model from the filesystem and database
    Rm { slug: String },
    /// Give a model a new slug
    Alias { old_slug: String, new_slug: String },
    /// Import existing models from the filesystem into the database
    Import,
    /// Reset the database and re-import existing models
    Reset,
    /// Start a model server and optionally complete text
    Run {
        slug: String,
        #[arg(trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Start a chat session with a model
    Chat { slug: String },
    /// Generate embeddings for the given text
    Embed {
        slug: String,
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Tokenize text using a model
    Tokenize {
        slug: String,
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Detokenize a JSON array of tokens, e.g. '[1, 2, 3]'
    Detokenize { slug: String, tokens: String },
    /// Health status of the running server
    Health,
    /// Properties of the running server
    Props,
    /// Show running server processes
    Ps,
    /// Stop a server by slug or PID, or every server with `all`
    Kill {
        #[arg(value_name = "SLUG|PID|all")]
        target: String,
    },
    /// Most recently modified GGUF models on Hugging Face
    Recent,
    /// Most downloaded GGUF models on Hugging Face
    Trending,
}

/// Everything a command needs, wired from configuration
pub struct App {
    pub config: Config,
    pub store: Store,
    pub manager: ModelManager,
    pub supervisor: Supervisor,
    pub client: ServerClient,
}

impl App {
    /// Open the store and build production components
    pub fn from_config(config: Config) -> GgufResult<Self> {
        let store = Store::open(&config.db_path)?;

        let manager = ModelManager::new(
            config.models_dir.clone(),
            Arc::new(HttpHubClient::new(config.hub_endpoint.clone())),
            Arc::new(HfHubDownloader::new(config.hub_endpoint.clone())),
        );

        let supervisor = Supervisor::new(
            SupervisorSettings::from_config(&config),
            Arc::new(SystemInspector::new()),
            Arc::new(SystemLauncher::new()),
            Arc::new(HttpHealthProbe::new(&config.api_url)?),
        );

        let client = ServerClient::new(&config.api_url, config.generation);

        Ok(Self {
            config,
            store,
            manager,
            supervisor,
            client,
        })
    }

    fn proxy(&self) -> Proxy<'_> {
        Proxy {
            supervisor: &self.supervisor,
            store: &self.store,
            client: &self.client,
        }
    }

    /// Execute one command, writing results to `out`
    pub async fn execute<W: Write>(self, command: Command, out: &mut W) -> GgufResult<()> {
        match command {
            Command::Pull { model_id } => match self.manager.pull(&self.store, &model_id).await? {
                PullOutcome::AlreadyPresent(path) => {
                    writeln!(
                        out,
                        "Model already exists at {}. Remove existing files to re-download.",
                        path.display()
                    )?;
                }
                PullOutcome::Downloaded(record) => {
                    writeln!(out, "Model added to database with slug: {}", record.slug)?;
                    writeln!(out, "To use this model, run: gguf chat {}", record.slug)?;
                }
            },
            Command::Ls => {
                let records = self.store.list()?;
                if records.is_empty() {
                    writeln!(out, "No models found. Use 'gguf pull <model_id>' to download one.")?;
                } else {
                    write!(out, "{}", render::model_table(&records))?;
                }
            }
            Command::Rm { slug } => {
                self.manager.remove(&self.store, &slug)?;
                writeln!(out, "Model '{}' removed from filesystem and database.", slug)?;
            }
            Command::Alias { old_slug, new_slug } => {
                self.manager.alias(&self.store, &old_slug, &new_slug)?;
                writeln!(out, "Model '{}' aliased to '{}'.", old_slug, new_slug)?;
            }
            Command::Import => {
                let report = self.manager.import_existing(&self.store)?;
                print_import(out, &report.imported, report.failed)?;
            }
            Command::Reset => {
                let (_store, report) = self.manager.reset(self.store)?;
                print_import(out, &report.imported, report.failed)?;
                writeln!(out, "Database reset and import complete.")?;
            }
            Command::Run { slug, text } => {
                self.proxy().run(&slug, &text.join(" "), out).await?;
            }
            Command::Chat { slug } => {
                let stdin = tokio::io::BufReader::new(tokio::io::stdin());
                self.proxy().chat(&slug, stdin, out).await?;
            }
            Command::Embed { slug, text } => {
                self.proxy().embed(&slug, &text.join(" "), out).await?;
            }
            Command::Tokenize { slug, text } => {
                self.proxy().tokenize(&slug, &text.join(" "), out).await?;
            }
            Command::Detokenize { slug, tokens } => {
                self.proxy().detokenize(&slug, &tokens, out).await?;
            }
            Command::Health => commands::health(&self.client, out).await?,
            Command::Props => commands::props(&self.client, out).await?,
            Command::Ps => {
                let processes = self.supervisor.list_processes(&self.store)?;
                if processes.is_empty() {
                    writeln!(out, "No running llama-server processes found.")?;
                } else {
                    write!(out, "{}", render::process_table(&processes))?;
                }
            }
            Command::Kill { target } => {
                let all = target == "all";
                let report = if all {
                    self.supervisor.kill_all().await?
                } else {
                    self.supervisor.kill(&self.store, &target)?
                };
                print_kill_report(out, &mut std::io::stderr(), &report, all)?;
            }
            Command::Recent => {
                let models = self.manager.list_remote(RemoteSort::LastModified).await?;
                write!(
                    out,
                    "{}",
                    render::remote_table(
                        &models,
                        "LAST MODIFIED",
                        "recent GGUF models from Hugging Face"
                    )
                )?;
            }
            Command::Trending => {
                let models = self.manager.list_remote(RemoteSort::Downloads).await?;
                write!(
                    out,
                    "{}",
                    render::remote_table(
                        &models,
                        "LAST UPDATED",
                        "trending GGUF models from Hugging Face"
                    )
                )?;
            }
        }
        Ok(())
    }
}

/// Per-PID kill outcome; with `all`, failures go to `err` and do not fail the command
fn print_kill_report<W: Write, E: Write>(
    out: &mut W,
    err: &mut E,
    report: &KillReport,
    all: bool,
) -> GgufResult<()> {
    for pid in &report.terminated {
        writeln!(out, "Terminated process {}.", pid)?;
    }
    for pid in &report.force_killed {
        writeln!(out, "Force killed process {}.", pid)?;
    }
    if report.is_empty() {
        writeln!(out, "No running llama-server processes found.")?;
    }
    if report.failures.is_empty() {
        return Ok(());
    }

    if all {
        for (pid, e) in &report.failures {
            writeln!(err, "Failed to stop process {}: {}", pid, e)?;
        }
        return Ok(());
    }
    Err(GgufError::Process(format!(
        "failed to stop {} process(es): {}",
        report.failures.len(),
        report
            .failures
            .iter()
            .map(|(pid, e)| format!("{} ({})", pid, e))
            .collect::<Vec<_>>()
            .join(", ")
    )))
}

fn print_import<W: Write>(out: &mut W, imported: &[String], failed: usize) -> GgufResult<()> {
    for slug in imported {
        writeln!(out, "Imported model: {}", slug)?;
    }
    if failed > 0 {
        writeln!(out, "{} file(s) could not be imported.", failed)?;
    }
    writeln!(out, "Import completed.")?;
    Ok(())
}
