//! Ask the chat backend a question, or replay a captured stream, from the terminal.

use std::io::Write as _;
use std::path::PathBuf;

use bytes::Bytes;
use chat_stream::observability::init_observability;
use chat_stream::prelude::*;
use chat_stream::source::dedup_by_title;
use clap::{Parser, Subcommand};
use tracing::info;

const USER_EMAIL_ENV: &str = "CHAT_STREAM_USER_EMAIL";

#[derive(Parser)]
#[command(name = "chat-stream")]
#[command(about = "Stream answers from the course assistant backend")]
struct Cli {
    /// Print the finalized output as JSON instead of rendered text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a question and stream the answer
    Ask {
        /// The question
        message: String,
        /// User identity sent with the request (defaults to CHAT_STREAM_USER_EMAIL)
        #[arg(short, long)]
        email: Option<String>,
        /// Existing thread to continue
        #[arg(short, long, default_value = "new")]
        thread: String,
        /// Backend base URL (defaults to CHAT_STREAM_BASE_URL)
        #[arg(long)]
        base_url: Option<String>,
        /// Restrict retrieval to one course
        #[arg(long)]
        course: Option<String>,
        /// Restrict retrieval to these materials
        #[arg(long = "material")]
        materials: Vec<String>,
    },
    /// Feed a captured response body through the ingestor
    Replay {
        /// File holding raw `data:` lines
        path: PathBuf,
        /// Bytes per simulated network chunk
        #[arg(short, long, default_value = "64")]
        chunk_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_observability();
    let cli = Cli::parse();

    let stream = match cli.command {
        Commands::Ask {
            message,
            email,
            thread,
            base_url,
            course,
            materials,
        } => {
            let email = email
                .or_else(|| std::env::var(USER_EMAIL_ENV).ok())
                .ok_or_else(|| format!("pass --email or set {USER_EMAIL_ENV}"))?;
            let mut config = ChatClientConfig::from_env()?;
            if let Some(base_url) = base_url {
                config = config.base_url(base_url);
            }
            let mut request = ChatRequest::new(message, email)
                .thread(thread)
                .material_ids(materials);
            if let Some(course) = course {
                request = request.course_id(course);
            }
            ChatClient::new(config)?.stream(request)?
        }
        Commands::Replay { path, chunk_size } => {
            if chunk_size == 0 {
                return Err("chunk size must be greater than 0".into());
            }
            let body = tokio::fs::read(&path).await?;
            info!(path = %path.display(), bytes = body.len(), chunk_size, "replaying capture");
            let chunks: Vec<Result<Bytes, StreamFailure>> = body
                .chunks(chunk_size)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            chat_stream::ingest(futures::stream::iter(chunks), IngestOptions::default())?
        }
    };

    let output = consume(stream, !cli.json).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_summary(&output);
    }
    Ok(())
}

/// Drains the stream, echoing progress and tokens. Ctrl-C aborts.
async fn consume(mut stream: ChatStream, echo: bool) -> Result<StreamOutput, IngestError> {
    let abort = stream.abort_handle();
    let mut stderr = std::io::stderr();
    let mut stdout = std::io::stdout();
    loop {
        let event = tokio::select! {
            event = stream.next_event() => event,
            _ = tokio::signal::ctrl_c() => {
                abort.abort();
                continue;
            }
        };
        let Some(event) = event else { break };
        if !echo {
            continue;
        }
        match event {
            StreamEvent::ProgressStep { label } => {
                let _ = writeln!(stderr, "… {label}");
            }
            StreamEvent::TokenDelta { text } => {
                let _ = write!(stdout, "{text}");
                let _ = stdout.flush();
            }
            StreamEvent::StreamEnded => {
                let _ = writeln!(stdout);
            }
            StreamEvent::ThreadAssigned { .. } | StreamEvent::SourcesFound { .. } => {}
        }
    }
    stream.finish().await
}

fn print_summary(output: &StreamOutput) {
    if let Some(failure) = output.outcome.failure() {
        eprintln!("stream ended early: {failure}");
    }
    let rendered = render_message(&output.message.content, &output.message.sources);
    let cited: Vec<CitationRef> = {
        let mut refs: Vec<_> = rendered.citations().collect();
        refs.sort_by_key(|c| c.index);
        refs.dedup();
        refs
    };
    if !cited.is_empty() {
        println!("\nReferences:");
        for citation in cited {
            match rendered.resolve(citation) {
                CitationTarget::Page { title, page, .. } => {
                    println!("  [{}] {title}, page {page}", citation.index)
                }
                CitationTarget::Source(source) => {
                    println!("  [{}] {}", citation.index, source.label())
                }
                CitationTarget::Inert => println!("  [{}] (no matching source)", citation.index),
            }
        }
    }
    let sources = dedup_by_title(&output.message.sources);
    if !sources.is_empty() {
        println!("\nSources:");
        for source in &sources {
            match &source.link {
                Some(link) => println!("  - {} <{link}>", source.label()),
                None => println!("  - {}", source.label()),
            }
        }
    }
    if !rendered.suggestions.is_empty() {
        println!("\nYou could ask next:");
        for (i, question) in rendered.suggestions.iter().enumerate() {
            println!("  {}. {question}", i + 1);
        }
    }
    if let Some(thread_id) = &output.thread_id {
        println!("\nthread: {thread_id}");
    }
}
