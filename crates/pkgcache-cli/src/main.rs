use clap::{Parser, Subcommand};
use pkgcache_core::config::{Config, MatchMode};
use pkgcache_index::{
    CacheOptions, Cursor, CursorEnd, JsonSource, MatchRule, Package, PackageCache,
};
use std::io;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pkgcache", version, about = "Local cache of package metadata")]
struct Cli {
    #[arg(long = "config", value_name = "PATH", help = "Config file to read")]
    config: Option<PathBuf>,
    #[arg(long = "db", value_name = "PATH", help = "Cache database location")]
    db: Option<PathBuf>,
    #[arg(
        long = "source",
        value_name = "PATH",
        help = "JSON package export to refresh the cache from"
    )]
    source: Option<PathBuf>,
    #[arg(long = "prefix", help = "Match names by prefix instead of exactly")]
    prefix: bool,
    #[arg(
        short = 'v',
        long = "verbose",
        help = "Increase verbosity",
        conflicts_with = "quiet"
    )]
    verbose: bool,
    #[arg(short = 'q', long = "quiet", help = "Suppress non-error output")]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Write a default config file")]
    Init,
    #[command(about = "Refresh the cache and list every package")]
    List {
        #[arg(long, help = "Print one JSON object per line")]
        json: bool,
    },
    #[command(about = "Refresh the cache and find packages by name")]
    Find {
        name: String,
        #[arg(long, help = "Print one JSON object per line")]
        json: bool,
    },
    #[command(about = "Keep the cache open and answer commands from stdin")]
    Session {
        #[arg(long, help = "Print one JSON object per line")]
        json: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing home directory in environment")]
    MissingHome,
    #[error("config file already exists at {0}")]
    ConfigExists(PathBuf),
    #[error("no package source configured, pass --source or set source.export_path")]
    MissingSource,
    #[error("config error: {0}")]
    Config(#[from] pkgcache_core::config::ConfigError),
    #[error("cache error: {0}")]
    Cache(#[from] pkgcache_index::CacheError),
    #[error("failed to create directory {0}: {1}")]
    CreateDir(PathBuf, io::Error),
    #[error("failed to write output: {0}")]
    Write(io::Error),
    #[error("failed to read input: {0}")]
    Read(io::Error),
    #[error("failed to encode package: {0}")]
    Json(serde_json::Error),
}

#[derive(Debug, Clone, Copy)]
struct Output {
    quiet: bool,
    verbose: bool,
}

impl Output {
    fn status(&self, message: impl AsRef<str>) {
        if !self.quiet {
            eprintln!("{}", message.as_ref());
        }
    }

    fn warn(&self, message: impl AsRef<str>) {
        if !self.quiet {
            eprintln!("{}", message.as_ref());
        }
    }

    fn verbose(&self, message: impl AsRef<str>) {
        if self.verbose && !self.quiet {
            eprintln!("{}", message.as_ref());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    db_path: PathBuf,
    source_path: PathBuf,
    match_rule: MatchRule,
    statement_cache_capacity: usize,
}

impl Settings {
    fn resolve(cli: &Cli, config: &Config) -> Result<Settings, CliError> {
        let db_path = match (&cli.db, &config.cache.path) {
            (Some(path), _) => path.clone(),
            (None, Some(path)) => expand_tilde(path)?,
            (None, None) => cache_db_path()?,
        };
        let source_path = match (&cli.source, &config.source.export_path) {
            (Some(path), _) => path.clone(),
            (None, Some(path)) => expand_tilde(path)?,
            (None, None) => return Err(CliError::MissingSource),
        };
        let match_rule = if cli.prefix {
            MatchRule::Prefix
        } else {
            to_match_rule(config.cache.match_mode)
        };
        Ok(Settings {
            db_path,
            source_path,
            match_rule,
            statement_cache_capacity: config.cache.statement_cache_capacity,
        })
    }

    fn cache_options(&self) -> CacheOptions {
        CacheOptions::new(&self.db_path)
            .with_match_rule(self.match_rule)
            .with_statement_cache_capacity(self.statement_cache_capacity)
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_tracing(&cli);
    let output = Output {
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config_path()?,
    };

    if let Command::Init = cli.command {
        return init_config(&output, &config_path);
    }

    let config = load_config_or_default(&config_path)?;
    let settings = Settings::resolve(&cli, &config)?;
    output.verbose(format!("cache: {}", settings.db_path.display()));
    output.verbose(format!("source: {}", settings.source_path.display()));

    let mut cache = open_cache(&settings)?;
    let mut source = JsonSource::new(&settings.source_path);
    let summary = cache.refresh(&mut source)?;
    output.status(format!(
        "cached {} packages in {:.1?}",
        summary.packages, summary.elapsed
    ));

    let stdout = io::stdout();
    match cli.command {
        Command::Init => Ok(()),
        Command::List { json } => {
            let mut out = stdout.lock();
            let mut query = cache.list()?;
            let mut cursor = query.cursor();
            write_packages(&mut out, &mut cursor, json)?;
            report_truncation(&output, &cursor);
            Ok(())
        }
        Command::Find { name, json } => {
            let mut out = stdout.lock();
            let mut query = cache.by_name(&name)?;
            let mut cursor = query.cursor();
            write_packages(&mut out, &mut cursor, json)?;
            report_truncation(&output, &cursor);
            Ok(())
        }
        Command::Session { json } => {
            let stdin = io::stdin();
            let mut out = stdout.lock();
            run_session(&output, &mut cache, &mut source, stdin.lock(), &mut out, json)?;
            cache.close()?;
            Ok(())
        }
    }
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn init_config(output: &Output, path: &Path) -> Result<(), CliError> {
    if path.exists() {
        return Err(CliError::ConfigExists(path.to_path_buf()));
    }
    ensure_parent_dir(path)?;
    Config::default().save_to_path(path)?;
    output.status(format!("wrote {}", path.display()));
    Ok(())
}

fn open_cache(settings: &Settings) -> Result<PackageCache, CliError> {
    ensure_parent_dir(&settings.db_path)?;
    Ok(PackageCache::open(settings.cache_options())?)
}

fn run_session<R: BufRead, W: Write>(
    output: &Output,
    cache: &mut PackageCache,
    source: &mut JsonSource,
    input: R,
    out: &mut W,
    json: bool,
) -> Result<(), CliError> {
    for line in input.lines() {
        let line = line.map_err(CliError::Read)?;
        let line = line.trim();
        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };
        let result = match command {
            "" => continue,
            "quit" | "exit" => break,
            "list" => cache.list().map_err(CliError::from).and_then(|mut query| {
                let mut cursor = query.cursor();
                write_packages(out, &mut cursor, json)?;
                report_truncation(output, &cursor);
                Ok(())
            }),
            "find" if argument.is_empty() => {
                writeln!(out, "error: find requires a name").map_err(CliError::Write)?;
                continue;
            }
            "find" => cache
                .by_name(argument)
                .map_err(CliError::from)
                .and_then(|mut query| {
                    let mut cursor = query.cursor();
                    write_packages(out, &mut cursor, json)?;
                    report_truncation(output, &cursor);
                    Ok(())
                }),
            "refresh" => cache
                .refresh(source)
                .map_err(CliError::from)
                .and_then(|summary| {
                    writeln!(out, "refreshed {} packages", summary.packages)
                        .map_err(CliError::Write)
                }),
            "status" => write_status(out, cache),
            "close" => cache.close().map_err(CliError::from).and_then(|()| {
                writeln!(out, "closed").map_err(CliError::Write)
            }),
            other => {
                writeln!(out, "error: unknown command: {}", other).map_err(CliError::Write)?;
                continue;
            }
        };
        match result {
            Ok(()) => {}
            Err(CliError::Write(err)) => return Err(CliError::Write(err)),
            Err(err) => writeln!(out, "error: {}", err).map_err(CliError::Write)?,
        }
        out.flush().map_err(CliError::Write)?;
    }
    Ok(())
}

fn write_status<W: Write>(out: &mut W, cache: &PackageCache) -> Result<(), CliError> {
    writeln!(out, "path: {}", cache.path().display()).map_err(CliError::Write)?;
    writeln!(out, "match: {}", match_rule_label(cache.match_rule())).map_err(CliError::Write)?;
    writeln!(out, "closed: {}", cache.is_closed()).map_err(CliError::Write)?;
    let written = match cache.last_refresh() {
        Some(summary) => writeln!(
            out,
            "last refresh: {} packages at {}",
            summary.packages,
            summary.completed_at.to_rfc3339()
        ),
        None => writeln!(out, "last refresh: never"),
    };
    written.map_err(CliError::Write)
}

fn write_packages<W: Write>(
    out: &mut W,
    cursor: &mut Cursor<'_>,
    json: bool,
) -> Result<(), CliError> {
    for pkg in cursor {
        write_package(out, &pkg, json)?;
    }
    Ok(())
}

fn write_package<W: Write>(out: &mut W, pkg: &Package, json: bool) -> Result<(), CliError> {
    if json {
        let line = serde_json::to_string(pkg).map_err(CliError::Json)?;
        writeln!(out, "{}", line).map_err(CliError::Write)
    } else {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            pkg.id,
            pkg.name,
            pkg.version,
            pkg.release,
            if pkg.installed { "installed" } else { "-" }
        )
        .map_err(CliError::Write)
    }
}

fn report_truncation(output: &Output, cursor: &Cursor<'_>) {
    if let Some(CursorEnd::Failed(err)) = cursor.end() {
        output.warn(format!("warning: results truncated: {}", err));
    }
}

fn to_match_rule(mode: MatchMode) -> MatchRule {
    match mode {
        MatchMode::Exact => MatchRule::Exact,
        MatchMode::Prefix => MatchRule::Prefix,
    }
}

fn match_rule_label(rule: MatchRule) -> &'static str {
    match rule {
        MatchRule::Exact => "exact",
        MatchRule::Prefix => "prefix",
    }
}

fn load_config_or_default(path: &Path) -> Result<Config, CliError> {
    if path.exists() {
        debug!("loading config from {}", path.display());
        Config::load_from_path(path).map_err(CliError::Config)
    } else {
        Ok(Config::default())
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), CliError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|err| CliError::CreateDir(parent.to_path_buf(), err)),
        _ => Ok(()),
    }
}

fn expand_tilde(path: &str) -> Result<PathBuf, CliError> {
    if let Some(rest) = path.strip_prefix("~/") {
        return Ok(home_dir()?.join(rest));
    }
    Ok(PathBuf::from(path))
}

fn config_dir() -> Result<PathBuf, CliError> {
    home_dir().map(|home| home.join(".config").join("pkgcache"))
}

fn cache_dir() -> Result<PathBuf, CliError> {
    Ok(config_dir()?.join("cache"))
}

fn config_path() -> Result<PathBuf, CliError> {
    Ok(config_dir()?.join("config.toml"))
}

fn cache_db_path() -> Result<PathBuf, CliError> {
    Ok(cache_dir()?.join("packages.db"))
}

fn home_dir() -> Result<PathBuf, CliError> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| CliError::MissingHome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> Output {
        Output {
            quiet: true,
            verbose: false,
        }
    }

    fn fixture(dir: &Path) -> PathBuf {
        let path = dir.join("packages.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "a", "name": "alpha", "version": "1.0", "release": 1, "summary": "s", "description": "d"},
                {"id": "b", "name": "beta", "version": "2.0", "release": 1, "installed": true}
            ]"#,
        )
        .expect("failed to write fixture");
        path
    }

    fn session(dir: &Path, script: &str) -> String {
        let source_path = fixture(dir);
        let mut cache = PackageCache::open(CacheOptions::new(dir.join("packages.db")))
            .expect("open failed");
        let mut source = JsonSource::new(&source_path);
        cache.refresh(&mut source).expect("refresh failed");

        let mut out = Vec::new();
        run_session(
            &quiet(),
            &mut cache,
            &mut source,
            script.as_bytes(),
            &mut out,
            false,
        )
        .expect("session failed");
        String::from_utf8(out).expect("output not utf-8")
    }

    #[test]
    fn cli_parses_find_subcommand() {
        let cli = Cli::try_parse_from(["pkgcache", "--source", "/tmp/p.json", "find", "jq"])
            .expect("parse failed");
        assert_eq!(cli.source, Some(PathBuf::from("/tmp/p.json")));
        match cli.command {
            Command::Find { name, json } => {
                assert_eq!(name, "jq");
                assert!(!json);
            }
            _ => panic!("expected find command"),
        }
    }

    #[test]
    fn cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["pkgcache"]).is_err());
    }

    #[test]
    fn cli_rejects_verbose_with_quiet() {
        assert!(Cli::try_parse_from(["pkgcache", "-v", "-q", "list"]).is_err());
    }

    #[test]
    fn settings_prefer_flags_over_config() {
        let cli = Cli::try_parse_from([
            "pkgcache",
            "--db",
            "/tmp/flag.db",
            "--source",
            "/tmp/flag.json",
            "--prefix",
            "list",
        ])
        .expect("parse failed");
        let mut config = Config::default();
        config.cache.path = Some("/tmp/config.db".to_string());
        config.source.export_path = Some("/tmp/config.json".to_string());
        config.cache.statement_cache_capacity = 3;

        let settings = Settings::resolve(&cli, &config).expect("resolve failed");
        assert_eq!(settings.db_path, PathBuf::from("/tmp/flag.db"));
        assert_eq!(settings.source_path, PathBuf::from("/tmp/flag.json"));
        assert_eq!(settings.match_rule, MatchRule::Prefix);
        assert_eq!(settings.statement_cache_capacity, 3);
    }

    #[test]
    fn settings_fall_back_to_config() {
        let cli = Cli::try_parse_from(["pkgcache", "list"]).expect("parse failed");
        let mut config = Config::default();
        config.cache.path = Some("/tmp/config.db".to_string());
        config.cache.match_mode = MatchMode::Prefix;
        config.source.export_path = Some("/tmp/config.json".to_string());

        let settings = Settings::resolve(&cli, &config).expect("resolve failed");
        assert_eq!(settings.db_path, PathBuf::from("/tmp/config.db"));
        assert_eq!(settings.source_path, PathBuf::from("/tmp/config.json"));
        assert_eq!(settings.match_rule, MatchRule::Prefix);
    }

    #[test]
    fn settings_require_a_source() {
        let cli =
            Cli::try_parse_from(["pkgcache", "--db", "/tmp/x.db", "list"]).expect("parse failed");
        let result = Settings::resolve(&cli, &Config::default());
        assert!(matches!(result, Err(CliError::MissingSource)));
    }

    #[test]
    fn session_answers_queries() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let output = session(dir.path(), "find alpha\nfind nothing\nlist\n");
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines[0], "a\talpha\t1.0\t1\t-");
        assert_eq!(lines.len(), 3);
        assert!(lines[1..].contains(&"b\tbeta\t2.0\t1\tinstalled"));
    }

    #[test]
    fn session_reports_errors_and_keeps_going() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let output = session(dir.path(), "bogus\nfind\nclose\nlist\nclose\nstatus\nquit\nlist\n");
        let lines: Vec<&str> = output.lines().collect();
        let path_line = format!("path: {}", dir.path().join("packages.db").display());
        assert_eq!(lines.len(), 9);
        assert_eq!(
            lines[..8],
            [
                "error: unknown command: bogus",
                "error: find requires a name",
                "closed",
                "error: cache error: cache is closed",
                "closed",
                path_line.as_str(),
                "match: exact",
                "closed: true",
            ]
        );
        assert!(lines[8].starts_with("last refresh: 2 packages at "));
    }

    #[test]
    fn session_refresh_picks_up_new_export() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let source_path = fixture(dir.path());
        let mut cache = PackageCache::open(CacheOptions::new(dir.path().join("packages.db")))
            .expect("open failed");
        let mut source = JsonSource::new(&source_path);
        cache.refresh(&mut source).expect("refresh failed");
        std::fs::write(
            &source_path,
            r#"[{"id": "a", "name": "alpha", "version": "1.1", "release": 2}]"#,
        )
        .expect("rewrite failed");

        let mut out = Vec::new();
        run_session(
            &quiet(),
            &mut cache,
            &mut source,
            "refresh\nlist\n".as_bytes(),
            &mut out,
            false,
        )
        .expect("session failed");
        let output = String::from_utf8(out).expect("output not utf-8");
        assert_eq!(output, "refreshed 1 packages\na\talpha\t1.1\t2\t-\n");
    }

    #[test]
    fn write_packages_drains_cursor() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let mut cache = PackageCache::open(CacheOptions::new(dir.path().join("packages.db")))
            .expect("open failed");
        cache
            .refresh(&mut JsonSource::new(fixture(dir.path())))
            .expect("refresh failed");

        let mut query = cache.by_name("beta").expect("query failed");
        let mut cursor = query.cursor();
        let mut out = Vec::new();
        write_packages(&mut out, &mut cursor, false).expect("write failed");
        assert_eq!(
            String::from_utf8(out).expect("output not utf-8"),
            "b\tbeta\t2.0\t1\tinstalled\n"
        );
        assert!(matches!(cursor.end(), Some(CursorEnd::Done)));
    }

    #[test]
    fn json_lines_decode_back_to_packages() {
        let pkg = Package {
            id: "a".to_string(),
            name: "alpha".to_string(),
            version: "1.0".to_string(),
            release: 1,
            ..Package::default()
        };
        let mut out = Vec::new();
        write_package(&mut out, &pkg, true).expect("write failed");
        let line = String::from_utf8(out).expect("output not utf-8");
        let decoded: Package = serde_json::from_str(line.trim()).expect("decode failed");
        assert_eq!(decoded, pkg);
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths() {
        assert_eq!(
            expand_tilde("/var/cache/p.db").expect("expand failed"),
            PathBuf::from("/var/cache/p.db")
        );
    }
}
