use crate::{Result, WorkerError};
use prover_core::Identity;
use std::path::Path;

fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Accounts read from an accounts file
#[derive(Debug, Default)]
pub struct Accounts {
    pub identities: Vec<Identity>,
    /// One `InvalidAccount` per line that could not be parsed
    pub rejected: Vec<WorkerError>,
}

fn parse_account(line_no: usize, line: &str) -> Result<Identity> {
    let (worker_id, credential) = line.split_once(',').ok_or_else(|| WorkerError::InvalidAccount {
        line: line_no,
        reason: "expected `worker_id,credential`".to_string(),
    })?;

    Identity::new(worker_id.trim(), credential.trim()).map_err(|e| WorkerError::InvalidAccount {
        line: line_no,
        reason: e.to_string(),
    })
}

/// Parse `worker_id,credential` lines. A bad line is set aside in
/// `rejected` and never affects the others.
pub fn parse_accounts(text: &str) -> Accounts {
    let mut accounts = Accounts::default();
    for (line_no, line) in content_lines(text) {
        match parse_account(line_no, line) {
            Ok(identity) => accounts.identities.push(identity),
            Err(e) => accounts.rejected.push(e),
        }
    }
    accounts
}

pub fn load_accounts(path: impl AsRef<Path>) -> Result<Accounts> {
    let accounts = parse_accounts(&std::fs::read_to_string(path)?);
    if accounts.identities.is_empty() && accounts.rejected.is_empty() {
        return Err(WorkerError::NoAccounts);
    }
    Ok(accounts)
}

/// One proxy URL per line
pub fn parse_proxies(text: &str) -> Vec<String> {
    content_lines(text).map(|(_, line)| line.to_string()).collect()
}

/// A missing proxy file means no proxies
pub fn load_proxies(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    Ok(parse_proxies(&std::fs::read_to_string(path)?))
}
