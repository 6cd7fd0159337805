use std::path::PathBuf;

use clap::{ArgAction, Parser};

pub const MODELSYNC_BEFORE_HELP: &str = concat!(
    "modelsync ",
    env!("CARGO_PKG_VERSION"),
    " – mirror catalog models into a web UI model folder\n\n",
    "Files that are already complete are verified or skipped, truncated files are\n",
    "moved aside to `{file}.inc` and fetched again, and preview images keep the\n",
    "local index they were first given.\n",
);

#[derive(Parser, Debug)]
#[command(author, version, before_help = MODELSYNC_BEFORE_HELP)]
#[allow(clippy::struct_excessive_bools)]
pub struct ModelsyncCli {
    #[arg(
        value_name = "URL",
        help = "Model page link, e.g. https://civitai.com/models/4201/realistic-vision"
    )]
    pub url: String,
    #[arg(
        long,
        value_name = "DIR",
        env = "MODELSYNC_ROOT",
        default_value = "./sd-webui-root-dir",
        help = "Web UI root; models land under models/Stable-diffusion and models/LoRA"
    )]
    pub root: PathBuf,
    #[arg(long, help = "Log what would be fetched without writing anything")]
    pub dry_run: bool,
    #[arg(long, help = "Also fetch files whose upstream pickle/virus scans did not pass")]
    pub allow_unsafe: bool,
    #[arg(
        long,
        help = "Abort instead of deleting a leftover .inc marker before a repair"
    )]
    pub keep_incomplete_markers: bool,
    #[arg(long, help = "Do not write .invalid markers next to files that fail verification")]
    pub no_invalid_markers: bool,
    #[arg(
        long,
        value_name = "URL",
        env = "MODELSYNC_API_BASE",
        default_value = modelsync_core::DEFAULT_API_BASE,
        help = "Catalog base URL"
    )]
    pub api_base: String,
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 300,
        help = "HTTP timeout for each request"
    )]
    pub timeout: u64,
    #[arg(short, long, help = "Suppress human output (errors still print to stderr)")]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q")]
    pub trace: bool,
    #[arg(long, help = "Emit {status,message,details} JSON envelopes")]
    pub json: bool,
    #[arg(long, help = "Disable colored human output")]
    pub no_color: bool,
}
