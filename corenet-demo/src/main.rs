//! HTTP server and client built on `corenet`, exercising the facade the way
//! `server/util`'s bins exercise `neutronium`: server mode binds, arms a
//! timer on accept, answers every complete request with a small JSON status
//! body (optionally gated behind HTTP basic auth); client mode (`--get`)
//! uses the blocking `http::solo_perform` helper to fetch one URL and print
//! the response, the way a `curl`-style smoke test would.
//!
//! Not part of the networking core (§1: "CLI wrappers ... are deliberately
//! out of scope"); this is a consumer of it.

use clap::{App, Arg};
use corenet::api::{authorize_http, respond_http};
use corenet::http::{self, HttpCode, HttpMethod};
use corenet::{Api, CbResult, CbType, Endpoint, Protocol};
use sloggers::types::Severity;
use std::time::Duration;

const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(20);

fn main() {
    let matches = App::new("corenet-demo")
        .version("0.1")
        .author("corenet contributors")
        .about("HTTP server/client built on the corenet facade")
        .arg(Arg::with_name("ADDR").help("Address to bind in server mode").default_value("127.0.0.1"))
        .arg(Arg::with_name("PORT").help("Port to bind in server mode").default_value("8080"))
        .arg(
            Arg::with_name("basic-auth")
                .long("basic-auth")
                .takes_value(true)
                .help("Require `Authorization: Basic <token>` matching this value"),
        )
        .arg(
            Arg::with_name("get")
                .long("get")
                .takes_value(true)
                .value_name("URL")
                .help("Fetch URL with the blocking client helpers instead of serving"),
        )
        .get_matches();

    if let Some(url) = matches.value_of("get") {
        run_client(url);
        return;
    }

    let addr = matches.value_of("ADDR").unwrap();
    let port: u16 = matches.value_of("PORT").unwrap().parse().expect("PORT must be numeric");
    let required_token = matches.value_of("basic-auth").map(str::to_string);
    run_server(addr, port, required_token);
}

fn run_client(url: &str) {
    let logger = corenet::logging::terminal(Severity::Info);

    match http::solo_perform(HttpMethod::Get, url, None) {
        Ok(response) => {
            slog::info!(logger, "fetched"; "url" => url, "status" => response.status_code);
            println!("HTTP {}", response.status_code);
            for (name, value) in response.headers().iter() {
                println!("{}: {}", name, value);
            }
            println!();
            println!("{}", String::from_utf8_lossy(response.body()));
        }
        Err(status) => {
            slog::error!(logger, "fetch failed"; "url" => url, "status" => format!("{}", status));
            std::process::exit(1);
        }
    }
}

fn run_server(addr: &str, port: u16, required_token: Option<String>) {
    let logger = corenet::logging::terminal(Severity::Info);

    let mut api: Api<()> = Api::builder().max_connections(4096).logger(logger.clone()).build().expect("reactor init");

    api.add_endpoint(Endpoint::tcp(addr, port, Protocol::Http))
        .expect("failed to bind listener");

    slog::info!(logger, "listening"; "addr" => addr, "port" => port);

    loop {
        api.service(Some(Duration::from_secs(1)), |ctx, conn| match ctx.cb_type {
            CbType::Accepted => {
                conn.arm(corenet::EventMask::IN);
                conn.set_timer(INACTIVITY_TIMEOUT);
                CbResult::Continue
            }
            CbType::Complete => {
                if let Some(expected) = &required_token {
                    if authorize_http(conn, Some(expected), None).is_err() {
                        respond_http(conn, HttpCode::UNAUTHORIZED, "Missing auth basic header");
                        return CbResult::Continue;
                    }
                }
                respond_http(conn, HttpCode::OK, "ok");
                CbResult::Continue
            }
            CbType::Timeout | CbType::Error | CbType::Closed => CbResult::Disconnect,
            _ => CbResult::Continue,
        })
        .expect("service loop failed");
    }
}
