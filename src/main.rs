//! drsh — an interactive line-editing shell.
//!
//! Entry point: argument parsing, `tracing-subscriber` init, and the
//! top-level interactive / source-files loops. Grounded on
//! `examples/dumitru-stama-Bark/src/main.rs`'s shape (panic hook
//! restoring terminal state, a `run` loop, `setup_terminal`/
//! `restore_terminal` pairing), rebuilt around this crate's own
//! `TermState` instead of `crossterm`/`ratatui`.

mod atom;
mod completion;
mod config;
mod dispatcher;
mod env;
mod errors;
mod gbuf;
#[cfg(unix)]
mod glob_posix;
mod input;
mod keydecoder;
mod line_editor;
mod term;
mod tokenizer;

use std::path::PathBuf;

use atom::AtomTable;
use dispatcher::{Outcome, ShellContext};
use env::{Environment, SpecialAtoms};
use errors::DrshResult;
use input::InputState;
use line_editor::EditOutcome;
use term::TermState;

const USAGE: &str = "usage: drsh [-h|--help] [-V|--version] [-v|--verbose]... [FILE...]";

struct Args {
    verbose: u8,
    files: Vec<String>,
}

enum ParsedArgs {
    Run(Args),
    Help,
    Version,
}

fn parse_args() -> ParsedArgs {
    let mut verbose = 0u8;
    let mut files = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => return ParsedArgs::Help,
            "-V" | "--version" => return ParsedArgs::Version,
            "-v" | "--verbose" => verbose = verbose.saturating_add(1),
            other => files.push(other.to_string()),
        }
    }
    ParsedArgs::Run(Args { verbose, files })
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = std::env::var("DRSH_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn setup_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        print!("\x1b[0m");
        let _ = std::io::Write::flush(&mut std::io::stdout());
        original_hook(panic_info);
    }));
}

fn main() {
    let parsed = parse_args();
    let args = match parsed {
        ParsedArgs::Help => {
            println!("{USAGE}");
            std::process::exit(0);
        }
        ParsedArgs::Version => {
            println!("drsh {}", env!("CARGO_PKG_VERSION"));
            std::process::exit(0);
        }
        ParsedArgs::Run(a) => a,
    };

    init_tracing(args.verbose);
    setup_panic_hook();

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("drsh: {e}");
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> DrshResult<i32> {
    let mut at = AtomTable::new();
    let case_insensitive = cfg!(windows);
    let mut env = Environment::init_from_process(&mut at, case_insensitive);
    let special = SpecialAtoms::new(&mut at);

    if let Ok(exe) = std::env::current_exe() {
        env.set_shell_path(&mut at, &exe.to_string_lossy());
    }
    env.increment_shlvl(&mut at);

    let config_path = config::config_path();
    let history_path = config::history_path();
    if let (Some(cp), Some(hp)) = (&config_path, &history_path) {
        config::publish_paths(&mut env, &mut at, cp, hp);
    }

    let mut cwd = std::env::current_dir()?;
    env.set_by_name(&mut at, "PWD", &cwd.to_string_lossy());

    #[cfg(unix)]
    let mut term = TermState::new(libc::STDIN_FILENO, libc::STDOUT_FILENO)?;
    #[cfg(windows)]
    let mut term = {
        use windows_sys::Win32::System::Console::{GetStdHandle, STD_INPUT_HANDLE, STD_OUTPUT_HANDLE};
        let in_handle = unsafe { GetStdHandle(STD_INPUT_HANDLE) };
        let out_handle = unsafe { GetStdHandle(STD_OUTPUT_HANDLE) };
        TermState::new(in_handle, out_handle)?
    };

    let mut input = InputState::new();
    if let Some(hp) = &history_path {
        input.load_history(config::load_history(hp, &mut at));
    }

    let mut ctx = ShellContext {
        at: &mut at,
        env: &mut env,
        special: &special,
        term: &mut term,
    };

    if args.files.is_empty() {
        if let Some(cp) = &config_path {
            if cp.exists() {
                let _ = source_startup_config(cp, &mut ctx, &mut cwd);
            }
        }
        let exit_code = interactive_loop(&mut ctx, &mut input, &mut cwd)?;
        if let Some(hp) = &history_path {
            config::save_history(hp, input.history_entries_since_start());
        }
        Ok(exit_code)
    } else {
        for file in &args.files {
            let line = format!("source {file}");
            let argv = tokenizer::line_to_argv(line.as_bytes(), ctx.env, ctx.at);
            let mut full = argv;
            full.push(ctx.at.atomize(b"")?);
            match dispatcher::dispatch(&full, &mut ctx, &mut cwd)? {
                Outcome::Exit => return Ok(0),
                Outcome::Continue => {}
            }
        }
        Ok(0)
    }
}

fn source_startup_config(
    path: &std::path::Path,
    ctx: &mut ShellContext,
    cwd: &mut PathBuf,
) -> DrshResult<()> {
    let line = format!("source {}", path.to_string_lossy());
    let argv = tokenizer::line_to_argv(line.as_bytes(), ctx.env, ctx.at);
    let mut full = argv;
    full.push(ctx.at.atomize(b"")?);
    dispatcher::dispatch(&full, ctx, cwd)?;
    Ok(())
}

fn interactive_loop(
    ctx: &mut ShellContext,
    input: &mut InputState,
    cwd: &mut PathBuf,
) -> DrshResult<i32> {
    ctx.term.raw()?;
    ctx.term.write(b"\x1b[?25h");

    let mut read_buf = [0u8; 256];
    let mut pending: Vec<u8> = Vec::new();

    'outer: loop {
        if ctx.term.state() != term::Mode::Raw {
            ctx.term.raw()?;
        }

        let now = clock_stamp();
        let home = ctx.env.home().map(|a| a.as_str().into_owned());
        let (prompt_bytes, prompt_len) =
            line_editor::build_prompt(&cwd.to_string_lossy(), home.as_deref(), &now);
        input.prompt_buffer = prompt_bytes;
        input.prompt_visual_len = prompt_len;
        input.needs_redisplay = true;

        let (cols, _rows) = ctx.term.window_size();
        line_editor::redisplay(ctx.term, input, cols as usize);

        loop {
            let n = read_stdin(&mut read_buf);
            if n == 0 {
                break 'outer;
            }
            pending.extend_from_slice(&read_buf[..n]);

            let mut consumed_any = false;
            while let Some((cmd, used)) = keydecoder::decode(&pending) {
                pending.drain(..used);
                consumed_any = true;
                if cmd == keydecoder::Command::Tab && !input.completion.active {
                    start_completion(ctx, input, cwd.as_path());
                }
                match line_editor::apply_command(input, cmd) {
                    EditOutcome::Continue => {}
                    EditOutcome::Eof => break 'outer,
                    EditOutcome::Accepted(line) => {
                        ctx.term.write(b"\r\n");
                        if process_line(&line, ctx, input, cwd)? {
                            break 'outer;
                        }
                        continue 'outer;
                    }
                }
            }
            if !consumed_any && pending.is_empty() {
                break;
            }
            let (cols, _rows) = ctx.term.window_size();
            line_editor::redisplay(ctx.term, input, cols as usize);
            if pending.is_empty() {
                break;
            }
        }
    }

    ctx.term.orig()?;
    ctx.term.write(b"\r\n");
    Ok(0)
}

/// Index of the start of the word the cursor is currently inside,
/// honoring `\ ` as an escaped (non-separator) space.
fn current_token_start(buf: &[u8], cursor: usize) -> usize {
    let mut i = cursor;
    while i > 0 {
        if buf[i - 1].is_ascii_whitespace() {
            let mut backslashes = 0;
            let mut j = i - 1;
            while j > 0 && buf[j - 1] == b'\\' {
                backslashes += 1;
                j -= 1;
            }
            if backslashes % 2 == 0 {
                break;
            }
        }
        i -= 1;
    }
    i
}

/// Strip the backslash from `\ ` pairs, leaving other backslashes as-is.
fn unescape_spaces(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b' ') {
            out.push(b' ');
            i += 2;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    out
}

/// Completions for an argument to `cd` are restricted to directories.
fn completion_dirs_only(buf: &[u8], token_start: usize) -> bool {
    let before = &buf[..token_start];
    tokenizer::tokenize(before)
        .first()
        .map(|t| t.bytes(before))
        == Some(b"cd".as_slice())
}

/// Build and install the tab-completion candidate list for the word
/// under the cursor. A no-op if directory enumeration fails outright
/// (permission denied, etc.); `completion.active` stays false and the
/// Tab keypress that triggered this falls through to its usual no-op.
fn start_completion(ctx: &mut ShellContext, input: &mut InputState, cwd: &std::path::Path) {
    let token_start = current_token_start(&input.write_buffer, input.write_cursor);
    let raw_token = input.write_buffer[token_start..input.write_cursor].to_vec();
    let (dirname, basename) = completion::split_dirname_basename(&raw_token);
    let dirname = unescape_spaces(&dirname);

    let dir = if dirname.is_empty() {
        cwd.to_path_buf()
    } else {
        let dirname_path = PathBuf::from(String::from_utf8_lossy(&dirname).into_owned());
        if dirname_path.is_absolute() {
            dirname_path
        } else {
            cwd.join(dirname_path)
        }
    };
    let dirs_only = completion_dirs_only(&input.write_buffer, token_start);

    if let Ok(candidates) = completion::build_candidates(ctx.at, &dir, &basename, dirs_only) {
        input.completion.start(candidates, dir, token_start);
    }
}

fn process_line(
    line: &[u8],
    ctx: &mut ShellContext,
    input: &mut InputState,
    cwd: &mut PathBuf,
) -> DrshResult<bool> {
    if dispatcher::is_empty_line(line) {
        return Ok(false);
    }
    input.history_push(ctx.at, line);
    let argv = tokenizer::line_to_argv(line, ctx.env, ctx.at);
    let mut full = argv;
    full.push(ctx.at.atomize(b"")?);
    match dispatcher::dispatch(&full, ctx, cwd)? {
        Outcome::Exit => Ok(true),
        Outcome::Continue => Ok(false),
    }
}

fn read_stdin(buf: &mut [u8]) -> usize {
    use std::io::Read;
    std::io::stdin().read(buf).unwrap_or(0)
}

/// A minimal, dependency-free HH:MM:SS stamp for the prompt. The
/// reference implementation uses the platform C library's localtime;
/// this mirrors only the fields the prompt actually displays.
fn clock_stamp() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let h = (secs / 3600) % 24;
    let m = (secs / 60) % 60;
    let s = secs % 60;
    format!("{h:02}:{m:02}:{s:02}")
}
