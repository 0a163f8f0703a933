use savetool::codes::{CodeBuilder, SavePatchEngine};
use savetool::config::{AppContext, Settings, SortMode, load_cfg};
use savetool::crypto::{KeyChain, PspSavedata};
use savetool::exec::{Dispatcher, Operations};
use savetool::frontend::Frontend;
use savetool::logging;
use savetool::net::NetTransport;
use savetool::paths::{AppPaths, PATH_APP, StorageTarget};
use savetool::providers::{Source, load_list};
use savetool::saves::{SaveFlags, SaveList};
use savetool::webserver::{self, CatalogRouter};
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

type CliResult = Result<(), Box<dyn Error>>;

const DEFAULT_PORT: u16 = 8080;

/// Terminal front end: questions on stdout, answers from stdin.
struct Console;

fn read_line() -> Option<String> {
    io::stdout().flush().ok();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

impl Frontend for Console {
    fn confirm(&mut self, message: &str) -> bool {
        print!("{} [y/N] ", message);
        read_line().is_some_and(|a| a.trim().eq_ignore_ascii_case("y"))
    }

    fn input_text(&mut self, title: &str, initial: &str) -> Option<String> {
        print!("{} [{}]: ", title, initial);
        let line = read_line()?;
        let line = line.trim();
        Some(if line.is_empty() { initial.to_string() } else { line.to_string() })
    }

    fn progress(&mut self, done: usize, total: usize, label: &str) {
        eprintln!("[{}/{}] {}", done, total, label);
    }

    fn message(&mut self, text: &str) {
        println!("{}", text);
    }

    fn hex_edit(&mut self, file: &Path) -> bool {
        println!("Decrypted file: {}", file.display());
        print!("Edit it now, then press Enter (type 'n' if left unchanged) ");
        read_line().is_some_and(|a| !a.trim().eq_ignore_ascii_case("n"))
    }

    fn wait_for_stop(&mut self, message: &str) {
        println!("{}", message);
        read_line();
    }
}

/// Source name plus the `vmc` path argument; returns the remaining args.
fn take_source(args: &[String]) -> Result<(Source, &[String]), Box<dyn Error>> {
    let name = args.first().ok_or("missing source")?;
    if name == "vmc" {
        let source = Source::parse(name, args.get(1).map(String::as_str))?;
        return Ok((source, args.get(2..).unwrap_or_default()));
    }
    Ok((Source::parse(name, None)?, &args[1..]))
}

fn take_index(args: &[String], pos: usize, what: &str) -> Result<usize, Box<dyn Error>> {
    let arg = args.get(pos).ok_or_else(|| format!("missing {}", what))?;
    arg.parse::<usize>()
        .map_err(|_| format!("'{}' is not a valid {}", arg, what).into())
}

/// Remove `flag <a,b,c>` from `args` and parse its indices.
fn take_list_flag(args: &mut Vec<String>, flag: &str) -> Result<Vec<usize>, Box<dyn Error>> {
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(Vec::new());
    };
    if pos + 1 >= args.len() {
        return Err(format!("{} needs a value", flag).into());
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    value
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| format!("bad index '{}' in {}", s, flag).into())
        })
        .collect()
}

fn parse_switch(value: &str) -> Result<bool, Box<dyn Error>> {
    match value {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(format!("expected on/off, got '{}'", other).into()),
    }
}

fn cmd_list(ctx: &AppContext, transport: &NetTransport, args: &[String]) -> CliResult {
    let (source, _) = take_source(args)?;
    let list = load_list(&source, ctx, transport)?;
    println!("{}", list.title);
    for (i, entry) in list.entries.iter().enumerate() {
        let mark = if list.is_menu(i) { '*' } else { ' ' };
        println!("{:4}{} {:<9}  {:<40}  {}", i, mark, entry.title_id, entry.name, entry.dir_name);
    }
    Ok(())
}

fn load_with_codes(
    ctx: &AppContext,
    transport: &NetTransport,
    source: &Source,
    index: usize,
) -> Result<SaveList, Box<dyn Error>> {
    let mut list = load_list(source, ctx, transport)?;
    let entry = list
        .entries
        .get_mut(index)
        .ok_or_else(|| format!("no entry {} in {}", index, list.title))?;
    CodeBuilder::new(ctx, &SavePatchEngine, transport).attach(entry)?;
    Ok(list)
}

fn cmd_codes(ctx: &AppContext, transport: &NetTransport, args: &[String]) -> CliResult {
    let (source, rest) = take_source(args)?;
    let index = take_index(rest, 0, "entry number")?;
    let list = load_with_codes(ctx, transport, &source, index)?;
    let entry = &list.entries[index];

    println!("{} ({})", entry.name, entry.dir_name);
    for (i, code) in entry.codes.iter().enumerate() {
        println!("{:4}  {}", i, code.name);
        for option in code.options.iter().take(1) {
            for (j, item) in option.items.iter().enumerate() {
                println!("          [{}] {}", j, item.label);
            }
        }
    }
    Ok(())
}

fn cmd_run(ctx: &AppContext, transport: &NetTransport, args: &[String]) -> CliResult {
    let mut args = args.to_vec();
    let cheats = take_list_flag(&mut args, "--cheats")?;
    let selected = take_list_flag(&mut args, "--select")?;

    let (source, rest) = take_source(&args)?;
    let index = take_index(rest, 0, "entry number")?;
    let code_index = take_index(rest, 1, "code number")?;
    let mut list = load_with_codes(ctx, transport, &source, index)?;

    for i in selected {
        if let Some(entry) = list.entries.get_mut(i) {
            entry.flags.insert(SaveFlags::SELECTED);
        }
    }
    let entry = &mut list.entries[index];
    for i in cheats {
        match entry.codes.get_mut(i) {
            Some(code) if code.is_cheat() => code.activated = true,
            _ => return Err(format!("code {} is not a cheat", i).into()),
        }
    }
    if rest.len() > 2 {
        let option = take_index(rest, 2, "option number")?;
        let code = entry
            .codes
            .get_mut(code_index)
            .ok_or_else(|| format!("no code {}", code_index))?;
        if !code.options.first_mut().is_some_and(|o| o.select(option)) {
            return Err(format!("code {} has no option {}", code_index, option).into());
        }
    }

    let keys = KeyChain::standard(&ctx.paths);
    let ops = Operations::new(ctx, transport, &PspSavedata, &keys, &SavePatchEngine);
    let mut console = Console;
    let outcome = Dispatcher::new(ops, &mut console).execute(&mut list, index, code_index);
    if !outcome.is_success() {
        return Err(format!("operation ended with {:?}", outcome.kind).into());
    }
    Ok(())
}

fn cmd_serve(ctx: &AppContext, transport: &NetTransport, args: &[String]) -> CliResult {
    let (source, rest) = take_source(args)?;
    let port = match rest.first() {
        Some(p) => p.parse::<u16>().map_err(|_| format!("'{}' is not a port", p))?,
        None => DEFAULT_PORT,
    };
    let list = load_list(&source, ctx, transport)?;
    let router = CatalogRouter::new(list, &ctx.paths.cache);
    webserver::serve(Box::new(router), port, &mut Console)?;
    Ok(())
}

fn cmd_set(ctx: &mut AppContext, transport: &NetTransport, args: &[String]) -> CliResult {
    let (Some(key), Some(value)) = (args.first(), args.get(1)) else {
        return Err("usage: set <key> <value>".into());
    };
    let mut settings = Settings::new(ctx);
    match key.as_str() {
        "storage" => {
            let target = match value.as_str() {
                "ms0" => StorageTarget::Ms0,
                "ef0" => StorageTarget::Ef0,
                other => return Err(format!("unknown storage '{}'", other).into()),
            };
            settings.set_storage(target)?;
            println!("Saves and exports now go to {}", target.label());
        }
        "sort" => {
            let mode = match value.as_str() {
                "none" => SortMode::Disabled,
                "name" => SortMode::ByName,
                "title" => SortMode::ByTitleId,
                "type" => SortMode::ByType,
                other => return Err(format!("unknown sort mode '{}'", other).into()),
            };
            settings.set_sort(mode)?;
        }
        "db" => settings.set_save_db_url(value)?,
        "ftp" => settings.set_ftp_url(value, transport)?,
        "debug" => {
            if let Some(log) = settings.set_debug_log(parse_switch(value)?)? {
                println!("Debug log: {}", log.display());
            }
        }
        "update-check" => settings.set_update_check(parse_switch(value)?)?,
        other => return Err(format!("unknown setting '{}'", other).into()),
    }
    println!("{} = {}", key, value);
    Ok(())
}

fn run_command(ctx: &mut AppContext, args: &[String]) -> CliResult {
    let transport = NetTransport::new();
    let (command, rest) = args.split_first().ok_or("missing command")?;
    match command.as_str() {
        "list" => cmd_list(ctx, &transport, rest),
        "codes" => cmd_codes(ctx, &transport, rest),
        "run" => cmd_run(ctx, &transport, rest),
        "serve" => cmd_serve(ctx, &transport, rest),
        "set" => cmd_set(ctx, &transport, rest),
        "clear-cache" => {
            let removed = Settings::new(ctx).clear_cache()?;
            println!("Removed {} cached entries", removed);
            Ok(())
        }
        "update-data" => {
            let files = Settings::new(ctx).update_app_data(&transport)?;
            println!("Updated {} data files", files);
            Ok(())
        }
        "check-update" => {
            match Settings::new(ctx).check_update(&transport)? {
                Some(url) => println!("New version available: {}", url),
                None => println!("savetool {} is up to date", env!("CARGO_PKG_VERSION")),
            }
            Ok(())
        }
        other => Err(format!("unknown command '{}'", other).into()),
    }
}

fn main() -> ExitCode {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|arg| arg == "--help") {
        println!("{}", USAGE_TEXT);
        return ExitCode::SUCCESS;
    }

    let mut root = PATH_APP.clone();
    if let Some(root_index) = args.iter().position(|arg| arg == "--root") {
        if root_index + 1 >= args.len() {
            eprintln!("{}", USAGE_TEXT);
            return ExitCode::FAILURE;
        }
        root = PathBuf::from(args.remove(root_index + 1));
        args.remove(root_index);
    }

    let paths = AppPaths::new(&root);
    if let Err(e) = paths.ensure_dirs() {
        eprintln!("[savetool] Cannot create {}: {}", root.display(), e);
        return ExitCode::FAILURE;
    }
    let config = load_cfg(&paths.settings_file());
    let log_file = config.debug_log.then(|| paths.log_file(config.storage));
    logging::init(config.debug_log, log_file.as_deref());

    let mut ctx = AppContext::new(config, paths);
    match run_command(&mut ctx, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[savetool] {}", e);
            ExitCode::FAILURE
        }
    }
}

static USAGE_TEXT: &str = r#"
Usage: savetool [--root DIR] <COMMAND>

Commands:
    list <source>                      List the saves of a source
    codes <source> <n>                 Show the codes available for entry n
    run <source> <n> <code> [option]   Run a code of entry n
        --cheats <i,j>                 Activate cheat codes before running
        --select <i,j>                 Mark entries for bulk commands
    serve <source> [port]              Serve the source as a web catalog (default port 8080)
    set <key> <value>                  Change a setting: storage (ms0|ef0), sort (none|name|title|type),
                                       db <url>, ftp <url>, debug (on|off), update-check (on|off)
    clear-cache                        Remove cached downloads
    update-data                        Refresh patches and game keys
    check-update                       Look for a newer release

Sources:
    hdd, usb, online, ftp, tools, vmc <file>

Options:
    --root <DIR>   Application data root (defaults to ~/.local/share/savetool)
    --help         Show this text
"#;
