use anyhow::{bail, Context, Result};
use clap::Parser;
use qconv::menu::ProjectMenu;
use qconv::selftest::{self, Report, SelfTestParams};
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Quantized convolution harness", long_about = None)]
struct Args {
    /// Operation mode: 'm' interactive menu, '0' accelerator exercise,
    /// '1' convolution self-test, 'c' case file only
    #[arg(long, default_value = "m")]
    mode: String,

    /// Seed for the randomized self-test
    #[arg(long, default_value_t = 0x5EED)]
    seed: u64,

    /// Number of randomized self-test cases
    #[arg(long, default_value_t = 64)]
    cases: usize,

    /// Largest input height/width drawn by the self-test
    #[arg(long, default_value_t = 6)]
    max_dim: usize,

    /// Worker threads for the parallel kernels (0 = rayon default)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// JSON-lines file of convolution cases
    #[arg(long)]
    case_file: Option<PathBuf>,

    /// Show a progress bar over self-test cases
    #[arg(long)]
    verbose: bool,
}

fn finish(what: &str, report: Report) -> Result<()> {
    println!("{}", report);
    if !report.all_passed() { bail!("{}: {} of {} comparisons failed", what, report.failed, report.performed); }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let params = SelfTestParams { seed: args.seed, cases: args.cases, max_dim: args.max_dim, progress: args.verbose };
    let mode = args.mode.chars().next().unwrap_or('m');
    match mode {
        'm' => {
            let mut menu = ProjectMenu::new(params);
            menu.case_file = args.case_file;
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            menu.run_loop(stdin.lock(), &mut stdout).context("menu i/o")?;
            stdout.flush()?;
            Ok(())
        }
        '0' => finish("accelerator exercise", selftest::exercise_cfu()),
        '1' => {
            let mut report = selftest::run_conv_selftest(&params);
            if let Some(path) = &args.case_file {
                report.merge(selftest::run_case_file(path, params.progress)?);
            }
            finish("convolution self-test", report)
        }
        'c' => {
            let Some(path) = args.case_file.as_deref() else { bail!("mode 'c' needs --case-file") };
            finish("case file", selftest::run_case_file(path, params.progress)?)
        }
        other => bail!("Invalid mode '{}': use 'm', '0', '1' or 'c'", other),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if args.threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(args.threads).build().context("build rayon pool")?;
        pool.install(|| run(args))
    } else {
        run(args)
    }
}
