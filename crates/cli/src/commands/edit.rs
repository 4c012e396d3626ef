//! `stepwise edit`: Run an edit session against a file.
//!
//! Replies come from recorded files, served in order, so a session can be
//! reproduced exactly. Narration goes to stderr, the last committed file to
//! stdout or `--output`.

use clap::Args;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use stepwise_agent::{
    AgentLoop, ConfirmTool, EditParams, EditRequest, EditTool, Narration, ProviderTokenizer,
    build_edit_context, run_agent,
};
use stepwise_config::AppConfig;
use stepwise_core::provider::Provider;
use stepwise_core::tool::ToolSet;
use stepwise_providers::ReplayProvider;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Args)]
pub struct EditArgs {
    /// File to edit
    #[arg(short, long)]
    file: PathBuf,

    /// First editable line (1-based)
    #[arg(long)]
    start: usize,

    /// Last editable line (inclusive)
    #[arg(long)]
    end: usize,

    /// What the edit should achieve
    #[arg(short, long)]
    request: String,

    /// Recorded model reply, one per attempt (repeatable)
    #[arg(long = "reply", required = true)]
    replies: Vec<PathBuf>,

    /// Keep going after an edit until the model confirms the request is done
    #[arg(long)]
    confirm: bool,

    /// Write the edited file here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

pub async fn run(args: EditArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let file_content = std::fs::read_to_string(&args.file)
        .map_err(|e| format!("Failed to read {}: {e}", args.file.display()))?;
    let request = EditRequest::new(&args.request, args.start, args.end, file_content)?;

    let provider: Arc<dyn Provider> =
        Arc::new(ReplayProvider::from_files(&args.replies, &config.replay)?);

    let context = build_edit_context(
        &ProviderTokenizer(provider.clone()),
        provider.context_length(),
        &config.edit,
        &request,
    );

    let committed = Arc::new(Mutex::new(None::<String>));
    let sink = committed.clone();
    let params = EditParams::from_request(&request).with_commit(move |code| {
        if let Ok(mut committed) = sink.lock() {
            *committed = Some(code.to_string());
        }
    });

    let mut tools = ToolSet::new().with(Box::new(EditTool::new(params)?));
    if args.confirm {
        tools.register(Box::new(ConfirmTool::new(request.request.clone())?));
    }

    info!(
        file = %args.file.display(),
        start = request.bound_start,
        end = request.bound_end,
        replies = args.replies.len(),
        "Starting edit session"
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let agent = AgentLoop::from_config(provider, &config, tools);
    let mut narration = run_agent(agent, context, cancel);
    let mut succeeded = false;
    while let Some(event) = narration.next().await {
        let event = event?;
        eprintln!("  {event}");
        succeeded |= event == Narration::Succeeded;
    }

    if !succeeded {
        return Err("The edit session ended without a successful edit".into());
    }

    let edited = committed
        .lock()
        .map_err(|_| "commit state poisoned")?
        .take()
        .unwrap_or(request.file_content);

    match args.output {
        Some(path) => {
            std::fs::write(&path, &edited)?;
            eprintln!("  Wrote {}", path.display());
        }
        None => println!("{edited}"),
    }

    Ok(())
}
