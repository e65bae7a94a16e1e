// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Writes access log lines for synthetic requests
//!
//! Useful to check a configuration and to watch rotation at work, e.g.:
//!
//! ```text
//! access-log-tool --log-file logs/access.log --rotation-pattern %Y%m%d%H%M --samples 600 --interval-ms 1000
//! ```

use access_log_module::{
    AccessLogConf, AccessLogOpt, AccessLogger, BufferedResponse, ResponseObserver,
};
use clap::Parser;
use http::header::{self, HeaderValue};
use http::{Method, Request, StatusCode};
use log::{error, info};
use std::error::Error;
use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

const PATHS: [&str; 4] = ["/", "/index.html", "/search?q=rust&page=2", "/missing"];

/// Write access log lines for synthetic requests
#[derive(Debug, Parser)]
struct Opt {
    /// The path to the configuration file. This command line flag can be specified multiple times.
    #[clap(short, long)]
    conf: Option<Vec<String>>,

    /// Test the configuration and exit, printing the compiled log format.
    #[clap(short = 't', long)]
    check: bool,

    /// Number of requests to log
    #[clap(long, default_value_t = 10)]
    samples: u64,

    /// Delay between two requests in milliseconds
    #[clap(long, default_value_t = 0)]
    interval_ms: u64,

    #[clap(flatten)]
    log: AccessLogOpt,
}

fn exchange(logger: &AccessLogger, index: u64) -> Result<(), Box<dyn Error>> {
    let received_at = SystemTime::now();
    let started = Instant::now();

    let path = PATHS[index as usize % PATHS.len()];
    let (request, ()) = Request::builder()
        .method(Method::GET)
        .uri(path)
        .header(header::HOST, "localhost")
        .header(
            header::USER_AGENT,
            concat!("access-log-tool/", env!("CARGO_PKG_VERSION")),
        )
        .body(())?
        .into_parts();

    let (status, body) = if path == "/missing" {
        (StatusCode::NOT_FOUND, &b"Not found\n"[..])
    } else {
        (StatusCode::OK, &b"Hello, world!\n"[..])
    };

    let mut response = ResponseObserver::new(BufferedResponse::default());
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    response.write_header(status)?;
    response.write_body(body)?;
    response.flush()?;

    let remote_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 40000 + (index % 1000) as u16));
    logger.log_exchange(
        &request,
        Some(remote_addr),
        &response,
        received_at,
        started.elapsed(),
    )?;
    Ok(())
}

async fn run(logger: Arc<AccessLogger>, samples: u64, interval: Duration) -> ExitCode {
    #[cfg(unix)]
    access_log_module::signal::reopen_on_signal(&logger);

    for index in 0..samples {
        if index > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }

        if let Err(err) = exchange(&logger, index) {
            error!("Failed logging request {index}: {err}");
            return ExitCode::FAILURE;
        }
    }

    info!("Logged {samples} requests");
    if let Err(err) = logger.close() {
        error!("Failed closing access log: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    env_logger::init();

    let opt = Opt::parse();

    let mut conf = match AccessLogConf::load_from_files(opt.conf.as_deref().unwrap_or(&[])) {
        Ok(conf) => conf,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    conf.merge_with_opt(opt.log);

    let logger = match AccessLogger::from_conf(&conf) {
        Ok(Some(logger)) => logger,
        Ok(None) => {
            info!("Access logging is disabled, nothing to do");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if opt.check {
        println!("Configuration is valid, log format:");
        println!("{:#?}", logger.template().segments());
        return ExitCode::SUCCESS;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed starting runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(
        Arc::new(logger),
        opt.samples,
        Duration::from_millis(opt.interval_ms),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use test_log::test;

    #[test]
    fn synthetic_requests() {
        let output = Arc::new(Mutex::new(Vec::new()));
        let logger = AccessLogger::new(r#"%a "%r" %s %b %{Content-Type}o"#, output.clone()).unwrap();
        for index in 0..4 {
            exchange(&logger, index).unwrap();
        }

        let output = String::from_utf8(output.lock().unwrap().clone()).unwrap();
        assert_eq!(
            output,
            "127.0.0.1 \"GET / HTTP/1.1\" 200 14 text/plain\n\
             127.0.0.1 \"GET /index.html HTTP/1.1\" 200 14 text/plain\n\
             127.0.0.1 \"GET /search?q=rust&page=2 HTTP/1.1\" 200 14 text/plain\n\
             127.0.0.1 \"GET /missing HTTP/1.1\" 404 10 text/plain\n"
        );
    }

    #[test]
    fn command_line() {
        let opt = Opt::try_parse_from([
            "access-log-tool",
            "-c",
            "a.yaml",
            "--conf",
            "b.yaml",
            "--log-format",
            "json",
            "--samples",
            "3",
        ])
        .unwrap();
        assert_eq!(
            opt.conf,
            Some(vec!["a.yaml".to_owned(), "b.yaml".to_owned()])
        );
        assert_eq!(opt.log.log_format.as_deref(), Some("json"));
        assert_eq!(opt.samples, 3);
        assert_eq!(opt.interval_ms, 0);
        assert!(!opt.check);
    }
}
