use std::path::{Path, PathBuf};

use dxfload_config::{AppConfig, ConfigError};
use dxfload_core::options::{DimensionMode, ImportOptions, RingMode};
use dxfload_io::DxfImporter;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod summary;

const USAGE: &str = "用法: dxfload [--config PATH] [--json] [--layer NAME] \
[--rings none|link|split] [--dimension auto|2d|3d] [--srid N] FILE";

/// 命令行参数，未给出的项沿用配置文件。
#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    json: bool,
    layer: Option<String>,
    rings: Option<RingMode>,
    dimension: Option<DimensionMode>,
    srid: Option<i32>,
    input: Option<PathBuf>,
}

impl CliArgs {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut parsed = CliArgs::default();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| format!("`{flag}` 需要提供参数值"))
            };
            match arg.as_str() {
                "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
                "--json" => parsed.json = true,
                "--layer" => parsed.layer = Some(value("--layer")?),
                "--rings" => {
                    parsed.rings = Some(value("--rings")?.parse().map_err(|e| format!("{e}"))?);
                }
                "--dimension" => {
                    parsed.dimension =
                        Some(value("--dimension")?.parse().map_err(|e| format!("{e}"))?);
                }
                "--srid" => {
                    let raw = value("--srid")?;
                    parsed.srid = Some(
                        raw.parse()
                            .map_err(|_| format!("SRID \"{raw}\" 不是合法的整数"))?,
                    );
                }
                "-h" | "--help" => return Err(USAGE.to_string()),
                other if other.starts_with("--") => return Err(format!("未知参数：{other}")),
                other => {
                    if parsed.input.is_some() {
                        return Err(format!("只能指定一个输入文件：{other}"));
                    }
                    parsed.input = Some(PathBuf::from(other));
                }
            }
        }
        Ok(parsed)
    }

    /// 命令行参数覆盖配置文件中的导入参数。
    fn apply(&self, mut options: ImportOptions) -> ImportOptions {
        if let Some(layer) = &self.layer {
            options.layer_filter = Some(layer.clone());
        }
        if let Some(rings) = self.rings {
            options.ring_mode = rings;
        }
        if let Some(dimension) = self.dimension {
            options.dimension = dimension;
        }
        if self.srid.is_some() {
            options.srid = self.srid;
        }
        options
    }
}

fn main() {
    let args = match CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(1);
        }
    };
    let Some(input) = args.input.clone() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };

    // 配置加载失败的警告在日志初始化之后输出
    let (config, problem) = load_configuration(args.config.as_deref());
    init_logging(&config);
    if let Some(problem) = problem {
        problem.report();
    }
    let options = args.apply(config.import.to_options());
    info!(path = %input.display(), ?options, "开始导入");

    let mut importer = DxfImporter::new(options);
    let result = importer.parse_file(&input);
    if let Err(err) = &result {
        error!(error = %err, "导入失败");
        if importer.line_count() == 0 {
            std::process::exit(1);
        }
    }

    if args.json {
        match serde_json::to_string_pretty(importer.drawing()) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                error!(error = %err, "序列化图层模型失败");
                std::process::exit(1);
            }
        }
    } else {
        summary::print(&importer);
    }

    if result.is_err() {
        std::process::exit(2);
    }
}

/// 配置加载失败的原因，日志初始化之后再输出。
enum ConfigProblem {
    Override { path: PathBuf, error: ConfigError },
    Discovery(ConfigError),
}

impl ConfigProblem {
    fn report(&self) {
        match self {
            ConfigProblem::Override { path, error } => {
                warn!(path = %path.display(), error = %error, "加载指定配置失败，使用默认配置");
            }
            ConfigProblem::Discovery(error) => match error {
                ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                    warn!(path = %path.display(), error = %error, "加载默认配置失败，使用内建默认值");
                }
                ConfigError::Context { .. } => {
                    warn!(error = %error, "加载默认配置失败，使用内建默认值");
                }
            },
        }
    }
}

fn load_configuration(override_path: Option<&Path>) -> (AppConfig, Option<ConfigProblem>) {
    let loaded = match override_path {
        Some(path) => AppConfig::from_file(path).map_err(|error| ConfigProblem::Override {
            path: path.to_path_buf(),
            error,
        }),
        None => AppConfig::discover().map_err(ConfigProblem::Discovery),
    };
    match loaded {
        Ok(config) => (config, None),
        Err(problem) => (AppConfig::default(), Some(problem)),
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    // 日志写到 stderr，stdout 留给摘要与 JSON 输出
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
