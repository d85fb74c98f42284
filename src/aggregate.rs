//! Multi-server execution and result aggregation.
//!
//! Each server gets exactly one attempt; a failure (network, HTTP status,
//! structural validation) becomes a visible placeholder row and never aborts
//! the batch. Attempts run on a bounded worker pool but outcomes are merged
//! in server list order, so the output is identical to a sequential run.

use crate::client::OcClient;
use crate::envelope::{self, NO_MATCH_CODE, SERVER_COLUMN, ServerMessage, ServerResult};
use serde_json::{Map, Value};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Upper bound on concurrent transport calls.
const MAX_WORKERS: usize = 4;

/// What one server's attempt produced.
#[derive(Debug)]
pub enum EndpointOutcome {
    Parsed {
        server: String,
        result: ServerResult,
    },
    Failed {
        server: String,
        reason: String,
    },
}

/// The merged table for one multi-server run.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResult {
    /// Column names, `TSM SERVER` always first.
    pub header: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub messages: Vec<ServerMessage>,
    pub command: String,
    pub servers: Vec<String>,
}

/// Accumulates per-server outcomes into one table.
///
/// Pure merge logic, kept separate from the transport harness: header is set
/// once by the first outcome that supplies one, rows and messages append,
/// nothing is ever rolled back.
#[derive(Debug, Default)]
pub struct ResultBuilder {
    header: Option<Vec<String>>,
    rows: Vec<Map<String, Value>>,
    messages: Vec<ServerMessage>,
}

impl ResultBuilder {
    pub fn absorb(&mut self, outcome: EndpointOutcome) {
        match outcome {
            EndpointOutcome::Parsed { server, result } => {
                let had_rows = !result.rows.is_empty();
                if self.header.is_none() {
                    self.header = result.header;
                }
                self.rows.extend(result.rows);
                if !had_rows {
                    // Leave a trace per message so the table shows we did
                    // query this server.
                    for message in &result.messages {
                        let text = if message.code == NO_MATCH_CODE {
                            "NO MATCH FOUND"
                        } else {
                            message.text.as_str()
                        };
                        self.rows.push(placeholder_row(&server, text));
                    }
                }
                self.messages.extend(result.messages);
            }
            EndpointOutcome::Failed { server, reason } => {
                self.rows.push(placeholder_row(&server, &reason));
            }
        }
    }

    pub fn finish(self, command: &str, servers: &[String]) -> AggregatedResult {
        AggregatedResult {
            // Every server failed or matched nothing: the table must still
            // render, keyed by the server column alone.
            header: self
                .header
                .unwrap_or_else(|| vec![SERVER_COLUMN.to_string()]),
            rows: self.rows,
            messages: self.messages,
            command: command.to_string(),
            servers: servers.to_vec(),
        }
    }
}

fn placeholder_row(server: &str, text: &str) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert(
        SERVER_COLUMN.to_string(),
        Value::String(format!("{server} - {text}")),
    );
    row
}

/// Runs one command against every server and merges the results.
pub fn execute(client: &OcClient, servers: &[String], command: &str) -> AggregatedResult {
    println!(
        "\nExecuting your command on {} TSM server(s)...",
        servers.len()
    );

    let slots: Mutex<Vec<Option<EndpointOutcome>>> =
        Mutex::new(servers.iter().map(|_| None).collect());
    let next = AtomicUsize::new(0);
    let workers = MAX_WORKERS.min(servers.len());

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(server) = servers.get(index) else {
                        break;
                    };
                    let outcome = attempt(client, server, command);
                    slots.lock().unwrap()[index] = Some(outcome);
                }
            });
        }
    });

    let mut builder = ResultBuilder::default();
    for outcome in slots.into_inner().unwrap().into_iter().flatten() {
        match &outcome {
            EndpointOutcome::Parsed { server, .. } => println!(" -> {server} : OK"),
            EndpointOutcome::Failed { server, reason } => println!(" -> {server} : {reason}"),
        }
        builder.absorb(outcome);
    }
    builder.finish(command, servers)
}

/// One transport + validate + parse attempt for one server.
fn attempt(client: &OcClient, server: &str, command: &str) -> EndpointOutcome {
    let mut raw = match client.issue_command(server, command) {
        Ok(raw) => raw,
        Err(e) => {
            return EndpointOutcome::Failed {
                server: server.to_string(),
                reason: e.to_string(),
            };
        }
    };

    // A structural failure is treated exactly like a transport failure.
    if let Err(e) = envelope::validate(&mut raw) {
        return EndpointOutcome::Failed {
            server: server.to_string(),
            reason: format!("ERROR: {e}"),
        };
    }

    match envelope::parse(&raw, server, command) {
        Ok(result) => EndpointOutcome::Parsed {
            server: server.to_string(),
            result,
        },
        Err(e) => EndpointOutcome::Failed {
            server: server.to_string(),
            reason: format!("ERROR: {e}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn parsed(server: &str, envelope: Value) -> EndpointOutcome {
        let mut envelope = envelope;
        envelope::validate(&mut envelope).unwrap();
        EndpointOutcome::Parsed {
            server: server.to_string(),
            result: envelope::parse(&envelope, server, "query node").unwrap(),
        }
    }

    #[test]
    fn header_is_set_once_by_first_supplier() {
        let mut builder = ResultBuilder::default();
        builder.absorb(EndpointOutcome::Failed {
            server: "tsm01".into(),
            reason: "ERROR: Timeout exceeded: 10 secs. Is oc.example reachable?".into(),
        });
        builder.absorb(parsed(
            "tsm02",
            json!([[{"hdr": ["NODE"], "items": [{"NODE": "N1"}]}]]),
        ));
        builder.absorb(parsed(
            "tsm03",
            json!([[{"hdr": ["NODE", "EXTRA"], "items": [{"NODE": "N2", "EXTRA": "x"}]}]]),
        ));

        let result = builder.finish("query node", &names(&["tsm01", "tsm02", "tsm03"]));
        assert_eq!(result.header, vec![SERVER_COLUMN, "NODE"]);
        assert_eq!(result.rows.len(), 3);
        // Later endpoints keep their own cells; rendering projects them onto
        // the established header.
        assert_eq!(result.rows[2]["EXTRA"], json!("x"));
    }

    #[test]
    fn failures_never_roll_back_earlier_rows() {
        let mut builder = ResultBuilder::default();
        builder.absorb(parsed(
            "tsm01",
            json!([[{"hdr": ["NODE"], "items": [{"NODE": "N1"}, {"NODE": "N2"}]}]]),
        ));
        builder.absorb(EndpointOutcome::Failed {
            server: "tsm02".into(),
            reason: "ERROR: Access denied! HTTP RC 403".into(),
        });

        let result = builder.finish("query node", &names(&["tsm01", "tsm02"]));
        assert_eq!(result.rows.len(), 3);
        assert_eq!(
            result.rows[2][SERVER_COLUMN],
            json!("tsm02 - ERROR: Access denied! HTTP RC 403")
        );
    }

    #[test]
    fn no_match_message_becomes_placeholder_row() {
        let mut builder = ResultBuilder::default();
        builder.absorb(parsed("tsmX", json!([[{"msg": {"n": "2034"}}]])));
        let result = builder.finish("query node none", &names(&["tsmX"]));

        assert_eq!(result.header, vec![SERVER_COLUMN]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0][SERVER_COLUMN], json!("tsmX - NO MATCH FOUND"));
        assert_eq!(result.messages.len(), 1);
    }

    #[test]
    fn other_message_codes_surface_their_text() {
        let mut builder = ResultBuilder::default();
        builder.absorb(parsed(
            "tsm01",
            json!([[{"msg": {"n": "2017", "def": "ANR2017I Command accepted"}}]]),
        ));
        let result = builder.finish("upd node", &names(&["tsm01"]));
        assert_eq!(
            result.rows[0][SERVER_COLUMN],
            json!("tsm01 - ANR2017I Command accepted")
        );
    }

    #[test]
    fn messages_with_rows_do_not_add_placeholders() {
        let mut builder = ResultBuilder::default();
        builder.absorb(parsed(
            "tsm01",
            json!([[
                {"hdr": ["NODE"], "items": [{"NODE": "N1"}]},
                {"msg": {"n": "1462", "def": "ANR1462I Command completed"}},
            ]]),
        ));
        let result = builder.finish("query node", &names(&["tsm01"]));
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.messages.len(), 1);
    }

    #[test]
    fn execute_merges_rows_and_failures_across_servers() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/oc/api/cli/issueConfirmedCommand/alpha");
            then.status(200).json_body(json!([[{
                "hdr": ["NODE", "STATUS"],
                "items": [
                    {"NODE": "N1", "STATUS": "Online"},
                    {"NODE": "N2", "STATUS": "Offline"},
                ],
            }]]));
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/oc/api/cli/issueConfirmedCommand/beta");
            then.status(500);
        });

        let client = OcClient::new(&format!("{}/oc", server.base_url()), "admin", "x").unwrap();
        let result = execute(&client, &names(&["alpha", "beta"]), "query node");

        assert_eq!(result.header, vec![SERVER_COLUMN, "NODE", "STATUS"]);
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[0][SERVER_COLUMN], json!("alpha"));
        assert_eq!(
            result.rows[2][SERVER_COLUMN],
            json!("beta - ERROR: Problem with syntax of TSM command or TSM account privileges")
        );
        assert_eq!(result.command, "query node");
        assert_eq!(result.servers, names(&["alpha", "beta"]));
    }

    #[test]
    fn execute_keeps_server_list_order_despite_concurrency() {
        let server = MockServer::start();
        let servers: Vec<String> = (0..8).map(|i| format!("srv{i}")).collect();
        for name in &servers {
            let path = format!("/oc/api/cli/issueConfirmedCommand/{name}");
            let body = json!([[{"hdr": ["NODE"], "items": [{"NODE": name}]}]]);
            server.mock(move |when, then| {
                when.method(POST).path(path.clone());
                then.status(200).json_body(body.clone());
            });
        }

        let client = OcClient::new(&format!("{}/oc", server.base_url()), "admin", "x").unwrap();
        let result = execute(&client, &servers, "query node");

        let order: Vec<&str> = result
            .rows
            .iter()
            .map(|row| row[SERVER_COLUMN].as_str().unwrap())
            .collect();
        assert_eq!(order, servers.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn execute_reports_invalid_structure_as_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/oc/api/cli/issueConfirmedCommand/alpha");
            then.status(200).json_body(json!({"unexpected": true}));
        });

        let client = OcClient::new(&format!("{}/oc", server.base_url()), "admin", "x").unwrap();
        let result = execute(&client, &names(&["alpha"]), "query node");

        assert_eq!(result.header, vec![SERVER_COLUMN]);
        assert_eq!(result.rows.len(), 1);
        let cell = result.rows[0][SERVER_COLUMN].as_str().unwrap();
        assert!(cell.contains("ERROR: Unsupported data structure"), "got {cell}");
    }

    #[test]
    fn execute_rewrites_legacy_empty_envelope() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/oc/api/cli/issueConfirmedCommand/endpointX");
            then.status(200).json_body(json!([[]]));
        });

        let client = OcClient::new(&format!("{}/oc", server.base_url()), "admin", "x").unwrap();
        let result = execute(&client, &names(&["endpointX"]), "select 1 from nodes");

        assert_eq!(result.header, vec![SERVER_COLUMN]);
        assert_eq!(
            result.rows[0][SERVER_COLUMN],
            json!("endpointX - NO MATCH FOUND")
        );
    }
}
