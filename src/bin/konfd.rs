//! The configuration daemon binary.
//!
//! Holds the in-memory configuration tree and serves clients over a
//! read-write UNIX socket (mode 0660) and an optional read-only socket
//! (mode 0666, dump only).

use std::cell::RefCell;
use std::rc::Rc;

use clap::Parser;
use tracing::{error, info};

use clish::konf::{daemon, ConfTree, KONFD_SOCKET_PATH};

const KONFD_PIDFILE: &str = "/var/run/konfd.pid";

#[derive(Parser)]
#[command(name = "konfd")]
#[command(about = "Daemon to store the running configuration")]
#[command(version)]
struct Cli {
    /// Read-write UNIX socket path
    #[arg(short = 's', long = "socket", default_value = KONFD_SOCKET_PATH)]
    socket: String,

    /// Read-only UNIX socket path (dump only)
    #[arg(short = 'S', long = "ro-socket")]
    ro_socket: Option<String>,

    /// File to save the daemon's PID to
    #[arg(short = 'p', long = "pid", default_value = KONFD_PIDFILE)]
    pidfile: String,

    /// Run as the named user
    #[arg(short = 'u', long = "user")]
    user: Option<String>,

    /// Run as the named group
    #[arg(short = 'g', long = "group")]
    group: Option<String>,

    /// Directory to chroot into
    #[arg(short = 'r', long = "chroot")]
    chroot: Option<String>,

    /// Debug mode: stay in the foreground
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Log facility
    #[arg(short = 'O', long = "facility", default_value = "daemon")]
    facility: String,
}

/// Minimal daemonization: fork, new session, stdio to /dev/null.
fn daemonize() -> Result<(), String> {
    unsafe {
        match libc::fork() {
            -1 => return Err("Can't fork".to_string()),
            0 => {}
            _ => std::process::exit(0),
        }
        if libc::setsid() == -1 {
            return Err("Can't create session".to_string());
        }
        if libc::chdir(b"/\0".as_ptr() as *const libc::c_char) != 0 {
            return Err("Can't chdir to /".to_string());
        }
        let fd = libc::open(b"/dev/null\0".as_ptr() as *const libc::c_char, libc::O_RDWR);
        if fd >= 0 {
            libc::dup2(fd, 0);
            libc::dup2(fd, 1);
            libc::dup2(fd, 2);
            if fd > 2 {
                libc::close(fd);
            }
        }
    }
    Ok(())
}

fn chmod(path: &str, mode: libc::mode_t) {
    if let Ok(cpath) = std::ffi::CString::new(path) {
        unsafe {
            libc::chmod(cpath.as_ptr(), mode);
        }
    }
}

fn drop_privileges(cli: &Cli) -> Result<(), String> {
    unsafe {
        if let Some(group) = &cli.group {
            let cgroup =
                std::ffi::CString::new(group.as_str()).map_err(|_| "Bad group".to_string())?;
            let grp = libc::getgrnam(cgroup.as_ptr());
            if grp.is_null() {
                return Err(format!("Can't identify group \"{}\"", group));
            }
            if libc::setgid((*grp).gr_gid) != 0 {
                return Err(format!("Can't set GID for group \"{}\"", group));
            }
        }
        if let Some(root) = &cli.chroot {
            let croot =
                std::ffi::CString::new(root.as_str()).map_err(|_| "Bad chroot".to_string())?;
            if libc::chroot(croot.as_ptr()) != 0 {
                return Err(format!("Can't chroot to {}", root));
            }
        }
        if let Some(user) = &cli.user {
            let cuser =
                std::ffi::CString::new(user.as_str()).map_err(|_| "Bad user".to_string())?;
            let pwd = libc::getpwnam(cuser.as_ptr());
            if pwd.is_null() {
                return Err(format!("Can't identify user \"{}\"", user));
            }
            if libc::setuid((*pwd).pw_uid) != 0 {
                return Err(format!("Can't set UID for user \"{}\"", user));
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    info!("Start daemon.");

    // A client closing mid-reply must not kill the daemon.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }

    let mut pidfile_written = false;
    if !cli.debug {
        if let Err(e) = daemonize() {
            error!("{}", e);
            std::process::exit(1);
        }
        if std::fs::write(&cli.pidfile, format!("{}\n", std::process::id())).is_ok() {
            pidfile_written = true;
        }
    }

    // Bind the listen sockets before dropping privileges.
    let _ = std::fs::remove_file(&cli.socket);
    let rw_std = match std::os::unix::net::UnixListener::bind(&cli.socket) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Can't bind socket {}: {}", cli.socket, e);
            std::process::exit(1);
        }
    };
    chmod(&cli.socket, 0o660);

    let ro_std = match &cli.ro_socket {
        Some(path) => {
            let _ = std::fs::remove_file(path);
            match std::os::unix::net::UnixListener::bind(path) {
                Ok(listener) => {
                    chmod(path, 0o666);
                    Some(listener)
                }
                Err(e) => {
                    error!("Can't bind socket {}: {}", path, e);
                    std::process::exit(1);
                }
            }
        }
        None => None,
    };

    if let Err(e) = drop_privileges(&cli) {
        error!("{}", e);
        std::process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Can't start runtime: {}", e);
            std::process::exit(1);
        }
    };

    runtime.block_on(async {
        let make_async = |l: std::os::unix::net::UnixListener| {
            l.set_nonblocking(true)
                .map_err(|e| e.to_string())
                .and_then(|_| {
                    tokio::net::UnixListener::from_std(l).map_err(|e| e.to_string())
                })
        };
        let rw = match make_async(rw_std) {
            Ok(l) => l,
            Err(e) => {
                error!("Can't use socket: {}", e);
                return;
            }
        };
        let ro = match ro_std.map(make_async).transpose() {
            Ok(l) => l,
            Err(e) => {
                error!("Can't use socket: {}", e);
                return;
            }
        };

        let tree = Rc::new(RefCell::new(ConfTree::root()));
        let shutdown = std::sync::Arc::new(tokio::sync::Notify::new());

        // Stop on TERM/INT/QUIT.
        let notifier = shutdown.clone();
        tokio::task::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut term = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => return,
            };
            let mut int = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(_) => return,
            };
            let mut quit = match signal(SignalKind::quit()) {
                Ok(s) => s,
                Err(_) => return,
            };
            tokio::select! {
                _ = term.recv() => {}
                _ = int.recv() => {}
                _ = quit.recv() => {}
            }
            notifier.notify_one();
        });

        daemon::serve(rw, ro, tree, shutdown).await;
    });

    // Cleanup.
    let _ = std::fs::remove_file(&cli.socket);
    if let Some(path) = &cli.ro_socket {
        let _ = std::fs::remove_file(path);
    }
    if pidfile_written {
        let _ = std::fs::remove_file(&cli.pidfile);
    }
    info!("Stop daemon.");
}
