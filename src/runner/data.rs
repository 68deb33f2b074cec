use std::path::Path;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub login: String,
    pub senha: String,
}

#[derive(Debug, Error)]
pub enum UsersError {
    #[error("failed to read users file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("users file line {line}: expected `login,senha`")]
    Malformed { line: usize },
    #[error("users file line {line}: {source}")]
    Csv {
        line: usize,
        #[source]
        source: csv::Error,
    },
    #[error("no users loaded from {0}")]
    Empty(String),
}

pub async fn load_users(file_path: &Path) -> Result<Vec<User>, UsersError> {
    let content = fs::read_to_string(file_path)
        .await
        .map_err(|source| UsersError::Read {
            path: file_path.display().to_string(),
            source,
        })?;

    let users = parse_users(&content)?;
    if users.is_empty() {
        return Err(UsersError::Empty(file_path.display().to_string()));
    }
    Ok(users)
}

/// Parses `login,senha` lines. No header; blank lines are skipped.
pub fn parse_users(content: &str) -> Result<Vec<User>, UsersError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut users = Vec::new();
    for record in reader.records() {
        let line = |e: &csv::Error| {
            e.position()
                .map(|p| p.line() as usize)
                .unwrap_or(users.len() + 1)
        };
        let record = record.map_err(|source| UsersError::Csv {
            line: line(&source),
            source,
        })?;

        let line_no = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(users.len() + 1);

        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        match (record.get(0), record.get(1)) {
            (Some(login), Some(senha)) if !login.is_empty() => users.push(User {
                login: login.to_string(),
                senha: senha.to_string(),
            }),
            _ => return Err(UsersError::Malformed { line: line_no }),
        }
    }

    Ok(users)
}

/// The user VU `vu` (1-based) logs in as.
pub fn user_for_vu(users: &[User], vu: u64) -> Option<&User> {
    if users.is_empty() || vu == 0 {
        return None;
    }
    let index = ((vu - 1) % users.len() as u64) as usize;
    users.get(index)
}
