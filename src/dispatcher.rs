//! Built-in recognition, program resolution, and process spawn.
//!
//! Grounded on the reference implementation's `drsh_process_line`
//! built-in dispatch and `drsh_spawn`/`drsh_resolve_program`
//! (SPEC_FULL.md §4.7). POSIX spawn uses `libc::posix_spawn` + `wait4`;
//! Windows uses `windows-sys`' `CreateProcessA` +
//! `WaitForSingleObject`, matching the platform split the teacher's own
//! `win_console.rs`/`persistent_shell.rs` draw between POSIX and
//! Windows process handling.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::atom::{Atom, AtomTable};
use crate::env::{Environment, SpecialAtoms};
use crate::errors::{DrshError, DrshResult};
use crate::term::TermState;

pub enum Outcome {
    Continue,
    Exit,
}

pub struct ShellContext<'a> {
    pub at: &'a mut AtomTable,
    pub env: &'a mut Environment,
    pub special: &'a SpecialAtoms,
    pub term: &'a mut TermState,
}

/// A single empty line (just CR or LF) is a pure no-op recognized
/// before tokenization ever runs.
pub fn is_empty_line(line: &[u8]) -> bool {
    line.is_empty() || line.iter().all(|&b| b == b'\r' || b == b'\n')
}

/// Dispatch a fully canonicalized argv (NULL-terminated per §4.6).
/// `argv` includes the trailing NULL atom; callers index `argv[0]` for
/// the command word and `&argv[..argv.len()-1]` for real arguments.
pub fn dispatch(argv: &[Atom], ctx: &mut ShellContext, cwd: &mut PathBuf) -> DrshResult<Outcome> {
    let real_len = argv.len().saturating_sub(1);
    if real_len == 0 {
        return Ok(Outcome::Continue);
    }
    let cmd = &argv[0];

    if *cmd == ctx.special.cd {
        builtin_cd(&argv[..real_len], ctx, cwd)?;
    } else if *cmd == ctx.special.echo {
        builtin_echo(&argv[..real_len], ctx);
    } else if *cmd == ctx.special.exit {
        return Ok(Outcome::Exit);
    } else if *cmd == ctx.special.pwd {
        builtin_pwd(ctx, cwd);
    } else if *cmd == ctx.special.set {
        builtin_set(argv, ctx);
    } else if *cmd == ctx.special.debug {
        builtin_debug(&argv[..real_len], ctx);
    } else if *cmd == ctx.special.source || *cmd == ctx.special.dot {
        if let Some(path) = argv.get(1).filter(|_| real_len >= 2) {
            return source_file(path, ctx, cwd);
        }
    } else if *cmd == ctx.special.time {
        run_external(&argv[1..real_len.max(1)], ctx, cwd, true)?;
    } else {
        run_external(&argv[..real_len], ctx, cwd, false)?;
    }
    Ok(Outcome::Continue)
}

fn builtin_cd(args: &[Atom], ctx: &mut ShellContext, cwd: &mut PathBuf) -> DrshResult<()> {
    if args.len() != 2 {
        return Ok(());
    }
    let target = PathBuf::from(args[1].as_str().into_owned());
    std::env::set_current_dir(&target)?;
    *cwd = std::env::current_dir()?;
    ctx.env.set_by_name(ctx.at, "PWD", &cwd.to_string_lossy());
    Ok(())
}

fn builtin_echo(args: &[Atom], ctx: &mut ShellContext) {
    let mut first = true;
    for a in args.iter().skip(1) {
        if !first {
            ctx.term.write(b" ");
        }
        ctx.term.write(a.as_bytes());
        first = false;
    }
    ctx.term.write(b"\r\n");
}

fn builtin_pwd(ctx: &mut ShellContext, cwd: &Path) {
    ctx.term.write(cwd.to_string_lossy().as_bytes());
    ctx.term.write(b"\r\n");
}

fn builtin_set(argv: &[Atom], ctx: &mut ShellContext) {
    match argv.len() {
        2 => {
            let pairs: Vec<(Atom, Atom)> = ctx.env.iter_sorted().cloned().collect();
            for (k, v) in &pairs {
                if cfg!(windows) {
                    let lower = k.lowercase_twin(ctx.at);
                    ctx.term.printf(format_args!("{k} ({lower})={v}"));
                } else {
                    ctx.term.printf(format_args!("{k}={v}"));
                }
                ctx.term.write(b"\r\n");
            }
        }
        4 => {
            let key_raw = &argv[1];
            let value = &argv[2];
            if !key_raw.is_empty() {
                ctx.env.set_env(ctx.at, key_raw, value);
            }
        }
        _ => {}
    }
}

fn builtin_debug(args: &[Atom], ctx: &mut ShellContext) {
    match args.get(1) {
        None => {
            ctx.term.printf(format_args!(
                "debug={}\r\n",
                if ctx.env.debug { "on" } else { "off" }
            ));
        }
        Some(a) => {
            let s = a.as_str();
            match s.as_ref() {
                "on" | "true" | "1" => ctx.env.debug = true,
                "off" | "false" | "0" => ctx.env.debug = false,
                _ => {}
            }
        }
    }
}

fn source_file(
    path: &Atom,
    ctx: &mut ShellContext,
    cwd: &mut PathBuf,
) -> DrshResult<Outcome> {
    let text = std::fs::read(path.as_str().into_owned())?;
    for raw_line in text.split(|&b| b == b'\n') {
        let line = raw_line.strip_suffix(b"\r").unwrap_or(raw_line);
        if is_empty_line(line) {
            continue;
        }
        let argv = crate::tokenizer::line_to_argv(line, ctx.env, ctx.at);
        let mut full = argv;
        full.push(ctx.at.atomize(b"")?);
        match dispatch(&full, ctx, cwd)? {
            Outcome::Exit => return Ok(Outcome::Exit),
            Outcome::Continue => {}
        }
    }
    Ok(Outcome::Continue)
}

/// Result of a completed child process.
pub struct SpawnResult {
    pub exit_code: i32,
    pub wall_time: std::time::Duration,
    pub user_time: Option<std::time::Duration>,
    pub sys_time: Option<std::time::Duration>,
}

fn has_path_sep(bytes: &[u8]) -> bool {
    bytes.contains(&b'/') || (cfg!(windows) && bytes.contains(&b'\\'))
}

fn is_absolute(bytes: &[u8]) -> bool {
    if bytes.first() == Some(&b'/') {
        return true;
    }
    if cfg!(windows) {
        if bytes.first() == Some(&b'\\') {
            return true;
        }
        if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
            return true;
        }
    }
    false
}

fn pathext_candidates(env: &mut Environment, at: &mut AtomTable) -> Vec<String> {
    if !cfg!(windows) {
        return vec![String::new()];
    }
    match env.get_by_name(at, "PATHEXT") {
        Some(a) => {
            let mut v: Vec<String> = a.as_str().split(';').map(|s| s.to_string()).collect();
            v.push(String::new());
            v
        }
        None => vec![
            ".COM".into(),
            ".EXE".into(),
            ".BAT".into(),
            ".CMD".into(),
            String::new(),
        ],
    }
}

fn ends_with_any_ext_ci(path: &Path, exts: &[String]) -> bool {
    let name = path.to_string_lossy().to_lowercase();
    exts.iter()
        .any(|e| !e.is_empty() && name.ends_with(&e.to_lowercase()))
}

fn try_candidate(base: &Path, env: &mut Environment, at: &mut AtomTable) -> Option<PathBuf> {
    let exts = pathext_candidates(env, at);
    if cfg!(windows) && ends_with_any_ext_ci(base, &exts) {
        return base.is_file().then(|| base.to_path_buf());
    }
    for ext in &exts {
        let candidate = if ext.is_empty() {
            base.to_path_buf()
        } else {
            let mut s = base.as_os_str().to_os_string();
            s.push(ext);
            PathBuf::from(s)
        };
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Resolve a program name to an executable path per SPEC_FULL.md
/// §4.7.1.
pub fn resolve_program(
    name: &[u8],
    env: &mut Environment,
    at: &mut AtomTable,
    cwd: &Path,
) -> DrshResult<PathBuf> {
    if has_path_sep(name) || is_absolute(name) {
        let base = PathBuf::from(String::from_utf8_lossy(name).into_owned());
        let base = if base.is_absolute() { base } else { cwd.join(base) };
        if let Some(found) = try_candidate(&base, env, at) {
            return Ok(found);
        }
        return Err(DrshError::NotFound(String::from_utf8_lossy(name).into_owned()));
    }

    let sep = if cfg!(windows) { ';' } else { ':' };
    if let Some(path_var) = env.get_by_name(at, "PATH") {
        for entry in path_var.as_str().split(sep) {
            if entry.is_empty() {
                continue;
            }
            let base = Path::new(entry).join(String::from_utf8_lossy(name).into_owned());
            tracing::trace!(dir = entry, program = %String::from_utf8_lossy(name), "trying PATH entry");
            if let Some(found) = try_candidate(&base, env, at) {
                return Ok(found);
            }
        }
    }

    if cfg!(windows) {
        let base = cwd.join(String::from_utf8_lossy(name).into_owned());
        if let Some(found) = try_candidate(&base, env, at) {
            return Ok(found);
        }
    }

    Err(DrshError::NotFound(String::from_utf8_lossy(name).into_owned()))
}

fn run_external(
    args: &[Atom],
    ctx: &mut ShellContext,
    cwd: &Path,
    timed: bool,
) -> DrshResult<()> {
    if args.is_empty() {
        return Ok(());
    }
    let program = match resolve_program(args[0].as_bytes(), ctx.env, ctx.at, cwd) {
        Ok(p) => p,
        Err(_) => {
            ctx.term.write(b"error\r\n");
            return Ok(());
        }
    };

    let _ = ctx.term.orig();
    let started = Instant::now();
    let result = spawn_and_wait(&program, args, ctx.env);
    ctx.term.unknown();
    let elapsed = started.elapsed();

    match result {
        Ok(mut r) => {
            r.wall_time = elapsed;
            tracing::debug!(exit_code = r.exit_code, ?elapsed, "child exited");
            if timed {
                print_timing(ctx, &r);
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, program = %program.display(), "spawn failed");
            ctx.term.write(b"error\r\n");
        }
    }
    Ok(())
}

fn print_timing(ctx: &mut ShellContext, r: &SpawnResult) {
    ctx.term.printf(format_args!("real {:.3}s", r.wall_time.as_secs_f64()));
    if let Some(u) = r.user_time {
        ctx.term.printf(format_args!("  user {:.3}s", u.as_secs_f64()));
    }
    if let Some(s) = r.sys_time {
        ctx.term.printf(format_args!("  sys {:.3}s", s.as_secs_f64()));
    }
    ctx.term.write(b"\r\n");
}

#[cfg(unix)]
fn spawn_and_wait(program: &Path, args: &[Atom], env: &mut Environment) -> std::io::Result<SpawnResult> {
    use std::ffi::CString;

    let prog_c = CString::new(program.as_os_str().to_string_lossy().into_owned())?;
    let arg_cstrings: Vec<CString> = args
        .iter()
        .map(|a| CString::new(a.as_bytes()).unwrap_or_else(|_| CString::new("").unwrap()))
        .collect();
    let mut argv_ptrs: Vec<*const libc::c_char> =
        arg_cstrings.iter().map(|c| c.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());

    let env_pairs: Vec<CString> = env
        .pairs()
        .iter()
        .map(|(k, v)| {
            let mut s = k.as_bytes().to_vec();
            s.push(b'=');
            s.extend_from_slice(v.as_bytes());
            CString::new(s).unwrap_or_else(|_| CString::new("").unwrap())
        })
        .collect();
    let mut envp_ptrs: Vec<*const libc::c_char> =
        env_pairs.iter().map(|c| c.as_ptr()).collect();
    envp_ptrs.push(std::ptr::null());

    let mut pid: libc::pid_t = 0;
    let rc = unsafe {
        libc::posix_spawn(
            &mut pid,
            prog_c.as_ptr(),
            std::ptr::null(),
            std::ptr::null(),
            argv_ptrs.as_ptr() as *const *mut libc::c_char,
            envp_ptrs.as_ptr() as *const *mut libc::c_char,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::from_raw_os_error(rc));
    }

    let mut status: libc::c_int = 0;
    let mut rusage: libc::rusage = unsafe { std::mem::zeroed() };
    loop {
        let got = unsafe { libc::wait4(pid, &mut status, 0, &mut rusage) };
        if got == -1 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        break;
    }

    let exit_code = if unsafe { libc::WIFEXITED(status) } {
        unsafe { libc::WEXITSTATUS(status) }
    } else {
        -1
    };
    let user_time = std::time::Duration::new(
        rusage.ru_utime.tv_sec as u64,
        (rusage.ru_utime.tv_usec as u32) * 1000,
    );
    let sys_time = std::time::Duration::new(
        rusage.ru_stime.tv_sec as u64,
        (rusage.ru_stime.tv_usec as u32) * 1000,
    );

    Ok(SpawnResult {
        exit_code,
        wall_time: std::time::Duration::ZERO,
        user_time: Some(user_time),
        sys_time: Some(sys_time),
    })
}

#[cfg(windows)]
fn needs_quoting(s: &[u8]) -> bool {
    s.iter().any(|&b| b == b' ' || b == b'\t')
}

#[cfg(windows)]
fn build_command_line(args: &[Atom]) -> String {
    let mut out = String::new();
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let s = a.as_str();
        if i == 0 || needs_quoting(a.as_bytes()) {
            out.push('"');
            out.push_str(&s);
            out.push('"');
        } else {
            out.push_str(&s);
        }
    }
    out
}

#[cfg(windows)]
fn spawn_and_wait(program: &Path, args: &[Atom], env: &mut Environment) -> std::io::Result<SpawnResult> {
    use std::ffi::CString;
    use windows_sys::Win32::Foundation::*;
    use windows_sys::Win32::System::Threading::*;

    let mut cmdline = CString::new(build_command_line(args))?;
    let prog = CString::new(program.as_os_str().to_string_lossy().into_owned())?;

    let mut env_block = env.to_envp_block();
    env_block.push(0);

    let mut si: STARTUPINFOA = unsafe { std::mem::zeroed() };
    si.cb = std::mem::size_of::<STARTUPINFOA>() as u32;
    let mut pi: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };

    let ok = unsafe {
        CreateProcessA(
            prog.as_ptr() as *const u8,
            cmdline.as_ptr() as *mut u8,
            std::ptr::null(),
            std::ptr::null(),
            1,
            0,
            env_block.as_ptr() as *const std::ffi::c_void,
            std::ptr::null(),
            &si,
            &mut pi,
        )
    };
    if ok == 0 {
        return Err(std::io::Error::last_os_error());
    }

    unsafe {
        WaitForSingleObject(pi.hProcess, INFINITE);
        let mut exit_code: u32 = 0;
        GetExitCodeProcess(pi.hProcess, &mut exit_code);
        CloseHandle(pi.hProcess);
        CloseHandle(pi.hThread);
        Ok(SpawnResult {
            exit_code: exit_code as i32,
            wall_time: std::time::Duration::ZERO,
            user_time: None,
            sys_time: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_line_detection() {
        assert!(is_empty_line(b""));
        assert!(is_empty_line(b"\r\n"));
        assert!(is_empty_line(b"\n"));
        assert!(!is_empty_line(b"echo"));
    }

    #[test]
    fn has_path_sep_detects_slash() {
        assert!(has_path_sep(b"./foo"));
        assert!(!has_path_sep(b"foo"));
    }

    #[test]
    fn resolve_absolute_existing_file() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        let exe = std::env::current_exe().unwrap();
        let bytes = exe.to_string_lossy().into_owned().into_bytes();
        let resolved = resolve_program(&bytes, &mut env, &mut at, Path::new(".")).unwrap();
        assert_eq!(resolved, exe);
    }

    #[test]
    fn resolve_missing_program_errs() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        env.set_by_name(&mut at, "PATH", "/nonexistent-zzz");
        let err = resolve_program(b"totally-not-a-real-binary", &mut env, &mut at, Path::new("."));
        assert!(err.is_err());
    }
}
