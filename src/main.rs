use anyhow::{anyhow, bail, Context, Result};
use binedit::logging::{self, LogLevel, Logger};
use binedit::{BinaryContent, CancelFlag, ContentOptions};
use std::path::PathBuf;

const USAGE: &str = "\
usage:
  binedit [--log-level LEVEL] [--log-file [PATH]] [--config FILE] dump <file> [--offset N] [--length N]
  binedit [--log-level LEVEL] [--log-file [PATH]] [--config FILE] patch <input> <output> --at N \
(--insert HEX | --overwrite HEX | --delete N)";

const DUMP_ROW: usize = 16;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, rest) = parse_global(&args)?;

    let logger = Logger::new(global.log_level);
    let logger = match global.log_file {
        Some(Some(path)) => logger.with_file_output(path),
        Some(None) => logger.with_default_file_output(),
        None => logger,
    };
    logging::init(logger);
    let options = match &global.config {
        Some(path) => ContentOptions::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ContentOptions::default(),
    };

    match rest.split_first() {
        Some((command, tail)) if command == "dump" => run_dump(tail, options),
        Some((command, tail)) if command == "patch" => run_patch(tail, options),
        _ => {
            eprintln!("{}", USAGE);
            bail!("missing or unknown command");
        }
    }
}

struct GlobalArgs {
    log_level: LogLevel,
    /// `Some(None)` はデフォルトのログファイル
    log_file: Option<Option<PathBuf>>,
    config: Option<PathBuf>,
}

fn parse_global(args: &[String]) -> Result<(GlobalArgs, Vec<String>)> {
    let mut global = GlobalArgs {
        log_level: LogLevel::Warning,
        log_file: None,
        config: None,
    };
    let mut rest = Vec::new();

    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--log-level" => {
                let value = iter.next().ok_or_else(|| anyhow!("--log-level needs a value"))?;
                global.log_level = LogLevel::parse(value)
                    .ok_or_else(|| anyhow!("unknown log level: {}", value))?;
            }
            "--log-file" => {
                let path = iter
                    .next_if(|next| !next.starts_with('-'))
                    .map(PathBuf::from);
                global.log_file = Some(path);
            }
            "--config" => {
                let value = iter.next().ok_or_else(|| anyhow!("--config needs a path"))?;
                global.config = Some(PathBuf::from(value));
            }
            _ => rest.push(arg.clone()),
        }
    }

    Ok((global, rest))
}

fn parse_number(value: &str) -> Result<u64> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.with_context(|| format!("not a number: {}", value))
}

fn parse_hex(value: &str) -> Result<Vec<u8>> {
    let digits: Vec<char> = value.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        bail!("hex data needs an even number of digits: {}", value);
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text: String = pair.iter().collect();
            u8::from_str_radix(&text, 16).with_context(|| format!("not hex: {}", text))
        })
        .collect()
}

fn option_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<&'a str> {
    iter.next()
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} needs a value", flag))
}

fn run_dump(args: &[String], options: ContentOptions) -> Result<()> {
    let mut path = None;
    let mut offset = 0u64;
    let mut length = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--offset" => offset = parse_number(option_value(&mut iter, "--offset")?)?,
            "--length" => length = Some(parse_number(option_value(&mut iter, "--length")?)?),
            _ if path.is_none() => path = Some(PathBuf::from(arg)),
            other => bail!("unexpected argument: {}", other),
        }
    }
    let path = path.ok_or_else(|| anyhow!("dump needs a file"))?;

    let content = BinaryContent::open_with_options(&path, options)
        .with_context(|| format!("opening {}", path.display()))?;
    let end = match length {
        Some(length) => offset.saturating_add(length).min(content.len()),
        None => content.len(),
    };

    let mut row = [0u8; DUMP_ROW];
    let mut position = offset;
    while position < end {
        let count = ((end - position) as usize).min(DUMP_ROW);
        let filled = content.get(&mut row[..count], position)?;
        if filled == 0 {
            break;
        }
        let hex: Vec<String> = row[..filled].iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = row[..filled]
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        println!("{:08x}  {:<47}  {}", position, hex.join(" "), ascii);
        position += filled as u64;
    }

    log::info!("read {} bytes from {}", content.file_bytes_read(), path.display());
    content.dispose();
    Ok(())
}

enum Patch {
    Insert(Vec<u8>),
    Overwrite(Vec<u8>),
    Delete(u64),
}

fn run_patch(args: &[String], options: ContentOptions) -> Result<()> {
    let mut paths = Vec::new();
    let mut at = None;
    let mut patch = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--at" => at = Some(parse_number(option_value(&mut iter, "--at")?)?),
            "--insert" => patch = Some(Patch::Insert(parse_hex(option_value(&mut iter, "--insert")?)?)),
            "--overwrite" => {
                patch = Some(Patch::Overwrite(parse_hex(option_value(&mut iter, "--overwrite")?)?))
            }
            "--delete" => patch = Some(Patch::Delete(parse_number(option_value(&mut iter, "--delete")?)?)),
            _ => paths.push(PathBuf::from(arg)),
        }
    }
    let [input, output] = <[PathBuf; 2]>::try_from(paths)
        .map_err(|_| anyhow!("patch needs <input> <output>"))?;
    let at = at.ok_or_else(|| anyhow!("patch needs --at"))?;
    let patch = patch.ok_or_else(|| anyhow!("patch needs --insert, --overwrite or --delete"))?;

    let mut content = BinaryContent::open_with_options(&input, options)
        .with_context(|| format!("opening {}", input.display()))?;
    let before = content.len();
    match patch {
        Patch::Insert(bytes) => content.insert(bytes, at)?,
        Patch::Overwrite(bytes) => content.overwrite(bytes, at)?,
        Patch::Delete(length) => content.delete(at, length),
    }
    if !content.is_dirty() {
        log::warn!("position {} is outside the content ({} bytes); nothing changed", at, before);
    }

    let written = if content.is_empty() {
        std::fs::File::create(&output).with_context(|| format!("writing {}", output.display()))?;
        0
    } else {
        content
            .export_to_file(&output, &CancelFlag::new())
            .with_context(|| format!("writing {}", output.display()))?
    };
    println!("{} -> {} ({} bytes)", input.display(), output.display(), written);
    content.dispose();
    Ok(())
}
