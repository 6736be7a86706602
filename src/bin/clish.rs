//! The interactive shell binary.

use clap::Parser;

use clish::konf::KONFD_SOCKET_PATH;
use clish::plugin::SymType;
use clish::shell::{loader, readline, Shell};
use clish::tinyrl::{Editor, Vt100};

#[derive(Parser)]
#[command(name = "clish")]
#[command(about = "A configurable interactive CLI shell")]
#[command(version)]
struct Cli {
    /// Config daemon UNIX socket path
    #[arg(short = 's', long = "socket", default_value = KONFD_SOCKET_PATH)]
    socket: String,

    /// Don't use the lockfile
    #[arg(short = 'l', long = "lockless")]
    lockless: bool,

    /// Stop script execution on the first error
    #[arg(short = 'e', long = "stop-on-error")]
    stop_on_error: bool,

    /// Non-interactive (background) mode
    #[arg(short = 'b', long = "background")]
    background: bool,

    /// Suppress command output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Force UTF-8 input
    #[arg(short = 'u', long = "utf8", conflicts_with = "bit8")]
    utf8: bool,

    /// Force 8-bit input
    #[arg(short = '8', long = "8bit")]
    bit8: bool,

    /// Dry-run: suppress non-permanent actions
    #[arg(short = 'd', long = "dry-run")]
    dryrun: bool,

    /// Syntax check mode (implies --lockless --dry-run, disables
    /// config and log hooks)
    #[arg(short = 'k', long = "check")]
    check: bool,

    /// XML scheme search path (semicolon separated)
    #[arg(short = 'x', long = "xml-path")]
    xml_path: Option<String>,

    /// Initial view name
    #[arg(short = 'w', long = "view")]
    view: Option<String>,

    /// Initial view-id assignments (NAME=VALUE;...)
    #[arg(short = 'i', long = "viewid")]
    viewid: Option<String>,

    /// Enable command logging
    #[arg(short = 'o', long = "log")]
    log: bool,

    /// Log facility
    #[arg(short = 'O', long = "facility", default_value = "local0")]
    facility: String,

    /// Idle timeout in seconds
    #[arg(short = 't', long = "timeout")]
    timeout: Option<u32>,

    /// Execute a literal command (repeatable; implies --quiet)
    #[arg(short = 'c', long = "command")]
    commands: Vec<String>,

    /// History file path
    #[arg(short = 'f', long = "histfile", default_value = "~/.clish_history")]
    histfile: String,

    /// History stifle limit
    #[arg(short = 'z', long = "histsize", default_value_t = 50)]
    histsize: usize,

    /// XSLT transform to apply to the scheme
    #[arg(short = 'p', long = "xslt")]
    xslt: Option<String>,

    /// Script files to execute
    #[arg()]
    scripts: Vec<String>,
}

fn init_logging(cli: &Cli) {
    use tracing_subscriber::EnvFilter;
    let filter = if cli.log {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn utf8_locale() -> bool {
    for var in ["LC_ALL", "LC_CTYPE", "LANG"] {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                return value.to_uppercase().contains("UTF-8")
                    || value.to_uppercase().contains("UTF8");
            }
        }
    }
    false
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    // A dead peer must not kill the shell.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }

    if cli.xslt.is_some() {
        eprintln!("Error: XSLT is not supported in this build.");
        std::process::exit(3);
    }

    let quiet = cli.quiet || !cli.commands.is_empty();
    let term = if quiet {
        Vt100::new(Some(0), Box::new(std::io::sink()))
    } else {
        Vt100::stdio()
    };
    let mut editor = Editor::new(term, cli.histsize);
    if cli.utf8 {
        editor.set_utf8(true);
    } else if cli.bit8 {
        editor.set_utf8(false);
    } else {
        editor.set_utf8(utf8_locale());
    }

    let mut shell = Shell::new(Some(editor));
    shell.set_socket(&cli.socket);
    if cli.lockless || cli.check {
        shell.set_lockfile(None);
    }
    if cli.background {
        shell.set_interactive(false);
    }
    if cli.log {
        shell.set_log(true);
    }
    if cli.dryrun || cli.check {
        shell.set_dryrun(true);
    }
    if let Some(timeout) = cli.timeout {
        shell.set_idle_timeout(timeout);
    }

    // Load the scheme.
    let xml_path = cli
        .xml_path
        .clone()
        .or_else(|| std::env::var("CLISH_PATH").ok())
        .unwrap_or_else(|| loader::DEFAULT_XML_PATH.to_string());
    if let Err(e) = loader::load_scheme_dirs(&mut shell, &xml_path) {
        eprintln!("Error: {}", e);
        std::process::exit(3);
    }

    // Initial view overrides.
    if let Some(view) = cli.view.clone().or_else(|| std::env::var("CLISH_VIEW").ok()) {
        shell.set_startup_view(&view);
    }
    if let Some(viewid) = cli
        .viewid
        .clone()
        .or_else(|| std::env::var("CLISH_VIEWID").ok())
    {
        shell.set_startup_viewid(&viewid);
    }

    shell.restore_history(&cli.histfile);

    // Load plugins, resolve symbols and access rights.
    if let Err(e) = shell.prepare() {
        eprintln!("Error: {}", e);
        std::process::exit(3);
    }

    // Syntax check mode neuters the config and log hooks.
    if cli.check {
        for hook in [SymType::Config, SymType::Log] {
            if let Some(sym) = shell.hook(hook) {
                sym.set_permanent(false);
            }
        }
    }

    // Input sources: -c commands, script files, or the terminal.
    if !cli.commands.is_empty() {
        shell.push_commands(cli.commands.clone(), cli.stop_on_error);
    }
    for script in cli.scripts.iter().rev() {
        if let Err(e) = shell.push_file(script, cli.stop_on_error) {
            eprintln!("Error: Can't open file {}: {}", script, e);
            std::process::exit(3);
        }
    }
    if !shell.has_files() && !shell.term_isatty() {
        // Piped stdin acts as a script source.
        if shell.push_file("/dev/stdin", cli.stop_on_error).is_err() {
            eprintln!("Error: Can't read standard input.");
            std::process::exit(3);
        }
    }

    // Banner and startup action.
    if let Err(state) = shell.startup() {
        std::process::exit(state.exit_code());
    }

    let state = readline::run_loop(&mut shell);
    let _ = shell.save_history(&cli.histfile);
    std::process::exit(state.exit_code());
}
