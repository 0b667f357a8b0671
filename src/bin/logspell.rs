use anyhow::Context;
use clap::Parser;
use logspell::miner::{LogMiner, MinerOpts, DEFAULT_MAX_LINE_LEN, DEFAULT_TAU};
use logspell::persistence::SnapshotStore;
use logspell::template::DEFAULT_EVENT_ID_LEN;
use logspell::tokenizer::DEFAULT_DELIMITERS;
use logspell::trie::DEFAULT_ANCHOR_DEPTH;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "logspell", version, about = "Streaming log template mining")]
struct Cli {
    /// Input files (`-` for stdin). Each one is mined as a batch, in order.
    #[arg(required = false)]
    input: Vec<String>,

    /// Directory for CSV output and the state snapshot
    #[arg(long = "out-dir", short = 'o', default_value = "logspell_out")]
    out_dir: PathBuf,

    /// Line grammar, e.g. "<Date> <Time> <Level> <Component>: <Content>"
    #[arg(long = "format")]
    format: Option<String>,

    /// LCS acceptance ratio, in (0, 1]
    #[arg(long = "tau", default_value_t = DEFAULT_TAU)]
    tau: f64,

    /// Skip lines longer than this many bytes
    #[arg(long = "max-line-length", default_value_t = DEFAULT_MAX_LINE_LEN)]
    max_line_length: usize,

    /// Do not extract parameters
    #[arg(long = "no-params", default_value_t = false)]
    no_params: bool,

    /// Per-line parameter extraction deadline in milliseconds
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,

    #[arg(long = "event-id-len", default_value_t = DEFAULT_EVENT_ID_LEN)]
    event_id_len: usize,

    /// Leading template positions used as trie anchors
    #[arg(long = "anchor-depth", default_value_t = DEFAULT_ANCHOR_DEPTH)]
    anchor_depth: usize,

    /// Regex matching one token delimiter
    #[arg(long = "delimiters", default_value = DEFAULT_DELIMITERS)]
    delimiters: String,

    /// Keep non-ASCII characters instead of replacing them with <NASCII>
    #[arg(long = "keep-non-ascii", default_value_t = false)]
    keep_non_ascii: bool,

    /// Also append every batch to NAME_main_structured.csv and keep NAME_main_templates.csv current
    #[arg(long = "main", value_name = "NAME")]
    main: Option<String>,

    /// Skip CSV output; the snapshot is still saved
    #[arg(long = "no-output", default_value_t = false)]
    no_output: bool,

    /// Worker threads for preprocessing and extraction (default: all cores)
    #[arg(long = "threads")]
    threads: Option<usize>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(long = "verbose", short = 'v', default_value_t = false)]
    verbose: bool,

    /// Print the final templates as JSON on stdout
    #[arg(long = "print-templates", default_value_t = false)]
    print_templates: bool,
}

impl Cli {
    fn miner_opts(&self) -> MinerOpts {
        MinerOpts {
            tau: self.tau,
            max_line_len: self.max_line_length,
            keep_params: !self.no_params,
            extraction_timeout: Duration::from_millis(self.timeout_ms),
            event_id_len: self.event_id_len,
            anchor_depth: self.anchor_depth,
            delimiters: self.delimiters.clone(),
            replace_non_ascii: !self.keep_non_ascii,
            log_format: self.format.clone(),
        }
    }
}

fn init_parallelism(threads: Option<usize>) {
    let n = threads.filter(|n| *n > 0).unwrap_or_else(num_cpus::get);
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(n).build_global() {
        tracing::debug!(error = %e, "rayon pool already initialised");
    }
}

fn read_lines(path: &str) -> io::Result<Vec<String>> {
    if path == "-" {
        return io::stdin().lock().lines().collect();
    }
    let f = File::open(path)?;
    BufReader::with_capacity(1 << 20, f).lines().collect()
}

fn batch_stem(path: &str) -> String {
    if path == "-" {
        return "stdin".to_string();
    }
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logspell::logging::init(cli.verbose);
    init_parallelism(cli.threads);

    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
            tracing::warn!(error = %e, "cannot install Ctrl-C handler");
        }
    }

    let opts = cli.miner_opts();
    opts.validate()?;
    let store = SnapshotStore::in_dir(&cli.out_dir);
    let state = store.load(opts.anchor_depth);
    let mut miner = LogMiner::with_state(opts, state)?;

    let inputs = if cli.input.is_empty() {
        vec!["-".to_string()]
    } else {
        cli.input.clone()
    };

    for input in &inputs {
        if !running.load(Ordering::SeqCst) {
            tracing::warn!("interrupted, remaining inputs skipped");
            break;
        }
        let lines = read_lines(input).with_context(|| format!("failed to read {input}"))?;
        tracing::info!(input = input.as_str(), lines = lines.len(), "mining batch");
        let batch = miner.parse_lines(&lines)?;

        if !cli.no_output {
            let keep_params = miner.opts().keep_params;
            logspell::output::write_batch(&cli.out_dir, &batch_stem(input), miner.headers(), &batch, keep_params)?;
            if let Some(name) = cli.main.as_deref() {
                logspell::output::write_main(
                    &cli.out_dir,
                    name,
                    miner.headers(),
                    &batch,
                    &miner.all_events(),
                    keep_params,
                )?;
            }
        }
        store
            .save(miner.registry())
            .with_context(|| format!("failed to save snapshot to {}", store.path().display()))?;
    }

    if cli.print_templates {
        println!("{}", serde_json::to_string_pretty(&miner.all_events())?);
    }
    tracing::info!(templates = miner.registry().len(), max_line_id = miner.registry().max_line_id(), "done");
    Ok(())
}
