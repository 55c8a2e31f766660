//! 冒烟客户端：打开设备、写入一行数字、再读回并打印。
//!
//! # 教案式说明（Why）
//! - 以最短路径走通 open → write → read → close，验证配置加载、日志初始化与核心读写协同；
//!
//! # 契约定义（What）
//! - 参数：`--policy <default|single|multi>`、`--config <path.toml>`、`--identity <i32>`，
//!   以及可选的位置参数作为写入负载（缺省为 `1234567890\n`）；
//! - `--config` 与 `--policy` 同时出现时，命令行策略覆盖文件中的策略；
//! - 日志级别由 `RUST_LOG` 控制，缺省为 `info`。

use std::{env, fs, process::ExitCode};

use spark_fifo::{FifoError, Multiplexer, MuxConfig, Policy};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PAYLOAD: &str = "1234567890\n";

#[derive(Debug, Default)]
struct Args {
    policy: Option<String>,
    config: Option<String>,
    identity: i32,
    payload: Option<String>,
}

fn main() -> ExitCode {
    install_logging();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(code = err.code(), "{err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), FifoError> {
    let args = parse_args(env::args().skip(1))?;
    let mut config = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|err| FifoError::InvalidConfig {
                detail: format!("cannot read `{path}`: {err}"),
            })?;
            MuxConfig::from_toml_str(&raw)?
        }
        None => MuxConfig::default(),
    };
    if let Some(policy) = &args.policy {
        config.policy = policy.parse::<Policy>()?;
    }

    let mux = Multiplexer::new(config)?;
    let handle = mux.open(args.identity)?;
    let payload = args.payload.as_deref().unwrap_or(DEFAULT_PAYLOAD);
    let written = handle.write(payload.as_bytes())?;
    // 空负载不会产生数据，此时读取会一直挂起。
    let echoed = if written == 0 {
        Default::default()
    } else {
        handle.read_bytes(spark_fifo::CAPACITY)?
    };
    handle.close();
    mux.shutdown();

    println!("{}", String::from_utf8_lossy(&echoed));
    tracing::info!(written, read = echoed.len(), "smoke run finished");
    Ok(())
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Args, FifoError> {
    let mut args = Args::default();
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--policy" => args.policy = Some(flag_value(&mut raw, "--policy")?),
            "--config" => args.config = Some(flag_value(&mut raw, "--config")?),
            "--identity" => {
                let value = flag_value(&mut raw, "--identity")?;
                args.identity = value.parse().map_err(|_| FifoError::InvalidConfig {
                    detail: format!("identity `{value}` is not an i32"),
                })?;
            }
            _ => args.payload = Some(arg),
        }
    }
    Ok(args)
}

fn flag_value(raw: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, FifoError> {
    raw.next().ok_or_else(|| FifoError::InvalidConfig {
        detail: format!("missing value for {flag}"),
    })
}

fn install_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
