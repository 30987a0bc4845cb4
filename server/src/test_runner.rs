#![cfg(test)]

//! This module runs test cases defined in `db/test/cases`.
//!
//! Each test case consists of two files, named in terms of `<name>`, the name of the test case:
//! * `<name>.path`: the path (and query string) to request
//! * `<name>.json`: the expected response, as `{ "status": <code>, "body": <JSON> }`
//!
//! This runner will start a server over an in-memory database seeded with `db/test/data`, scan the
//! cases directory for all such pairs of files, make each request, and make sure that the response
//! matches the expected response. The body is only compared for successful responses.
//!
//! The server runs with its clock fixed at 2022-09-08T12:00:00Z, so the default history window
//! starts at 2022-09-07T00:00:00Z.

use super::Options;
use crate::process_time::PROCESS_TIME_HEADER;
use ansi_term::Color;
use anyhow::Error;
use async_std::task::{sleep, spawn};
use chrono::{TimeZone, Utc};
use clap::Parser;
use futures::future::join_all;
use nowcasting_model::{
    db::{self, mock, Dataset},
    init_logging,
    query::Clock,
};
use portpicker::pick_unused_port;
use serde_json::Value;
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;
use surf::{http::StatusCode, Client};

#[async_std::test]
async fn api_test_cases() -> Result<(), Error> {
    init_logging();

    // Discover test cases.
    let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).parent().unwrap();
    let test_cases = workspace
        .join("db/test/cases")
        .read_dir()?
        .filter_map(|dirent| {
            let path = dirent.unwrap().path();
            if path.extension()?.to_str().unwrap() == "path" {
                Some(TestCase::new(&path).unwrap())
            } else {
                None
            }
        })
        .collect::<Vec<_>>();
    assert!(!test_cases.is_empty(), "no test cases found");

    // Seed a database.
    let conn = mock::Connection::create();
    let dataset = Dataset::open(workspace.join("db/test/data/dataset.json"))?;
    db::load(&conn, &dataset).await?;

    // Start a server.
    let port = pick_unused_port().unwrap();
    let opt = Options::parse_from([
        "nowcasting-server",
        "--port",
        &port.to_string(),
        "--history",
        "yesterday",
    ]);
    let clock = Clock::Fixed(Utc.with_ymd_and_hms(2022, 9, 8, 12, 0, 0).unwrap());
    spawn(async move {
        opt.serve_with(conn, clock).await.unwrap();
        tracing::warn!("server exited");
    });

    // Connect a client.
    let client: Client = surf::Config::default()
        .set_base_url(format!("http://localhost:{port}").parse().unwrap())
        .try_into()
        .unwrap();
    // Wait for the server to come up.
    wait_for_server(&client).await?;

    let results = join_all(test_cases.into_iter().map(|test| test.run(client.clone()))).await;
    for result in &results {
        println!("{}", result);
    }
    if results.iter().any(TestResult::failed) {
        Err(Error::msg(format!("{}", Color::Red.paint("tests failed"))))
    } else {
        println!("All test cases passed.");
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct TestCase {
    name: OsString,
    path: String,
    status: u16,
    body: Option<Value>,
}

impl TestCase {
    fn new(request_path: impl AsRef<Path>) -> Result<Self, Error> {
        let request_path = request_path.as_ref();
        let name = request_path.file_stem().unwrap();
        let path = fs::read_to_string(request_path)?.trim().to_string();
        let response_path = request_path.with_extension("json");
        let response: Value = serde_json::from_reader(File::open(response_path)?)?;
        let status = response
            .get("status")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::msg("expected response is missing a status"))?;
        Ok(Self {
            name: name.into(),
            path,
            status: status.try_into()?,
            body: response.get("body").cloned(),
        })
    }

    async fn run(self, client: Client) -> TestResult {
        TestResult {
            name: self.name,
            failure: Self::do_test(client, self.path, self.status, self.body)
                .await
                .err(),
        }
    }

    async fn do_test(
        client: Client,
        path: String,
        expected_status: u16,
        expected_body: Option<Value>,
    ) -> Result<(), Error> {
        let mut res = client.get(&path).await.map_err(Error::msg)?;
        if u16::from(res.status()) != expected_status {
            return Err(Error::msg(format!(
                "expected status {expected_status}, got {}",
                res.status()
            )));
        }
        if res.header(PROCESS_TIME_HEADER).is_none() {
            return Err(Error::msg(format!(
                "response is missing {PROCESS_TIME_HEADER}"
            )));
        }
        if res.status() != StatusCode::Ok {
            return Ok(());
        }

        let body: Value = res
            .body_json()
            .await
            .map_err(|err| Error::msg(format!("cannot parse reponse body as JSON: {err}")))?;
        match expected_body {
            Some(expected) if body != expected => Err(Error::msg(format!(
                "expected response:\n{expected}\nactual response:\n{body}"
            ))),
            _ => Ok(()),
        }
    }
}

struct TestResult {
    name: OsString,
    failure: Option<anyhow::Error>,
}

impl TestResult {
    fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

impl Display for TestResult {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}...", self.name.to_string_lossy())?;
        if let Some(err) = &self.failure {
            writeln!(f, "{}", Color::Red.paint("FAILED"))?;
            write!(f, "{err}")?;
        } else {
            write!(f, "{}", Color::Green.paint("OK"))?;
        }
        Ok(())
    }
}

async fn wait_for_server(client: &Client) -> Result<(), Error> {
    const MAX_CONNECT_RETRIES: usize = 60;

    for _ in 0..MAX_CONNECT_RETRIES {
        match client.get("/").await {
            Ok(_) => return Ok(()),
            Err(err) => {
                tracing::warn!("waiting for server to start: {err}");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }

    Err(Error::msg("timed out waiting for server"))
}
