//! Command Dispatcher.
//!
//! One invocation runs `parse → validate arity → execute → serialise` and
//! always ends in exactly one [`Reply`]: a JSON body plus an exit status.
//!
//! Parsing does all the input work that cannot touch the store: command-name
//! lookup, arity, numeric arguments and base64 decoding. A [`Command`] that
//! exists is therefore safe to execute; anything rejected earlier never
//! reaches the store.

use std::sync::Arc;

use lorekeeper_store::{MemoryStore, codec, filter};
use lorekeeper_types::{
    CountOutcome, DeleteOutcome, MemoryError, MemoryRecord, Metadata, MetadataValue, Predicate,
    QueryResultItem, validate_collection_name,
};
use serde::Serialize;
use serde_json::Number;
use tracing::{debug, warn};

/// Result count used when `query` omits `limit`.
pub const DEFAULT_LIMIT: usize = 5;

/// Sentinel meaning "no minimum importance".
const NO_MIN_IMPORTANCE: &str = "-1";

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// A fully parsed, decoded and validated invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateCollection {
        name: String,
    },
    AddMemory {
        collection: String,
        record: MemoryRecord,
    },
    Query {
        collection: String,
        query_text: String,
        limit: usize,
        predicate: Option<Predicate>,
    },
    GetById {
        collection: String,
        id: String,
    },
    DeleteCollection {
        name: String,
    },
    ListCollections,
    Count {
        collection: String,
    },
}

/// Canonical name and required argument count for a command word.
///
/// Both the snake_case and camelCase spellings are accepted.
fn lookup(word: &str) -> Option<(&'static str, usize)> {
    Some(match word {
        "create_collection" | "createCollection" => ("create_collection", 1),
        "add_memory" | "addMemory" => ("add_memory", 3),
        "query" => ("query", 2),
        "get_by_id" | "getById" => ("get_by_id", 2),
        "delete_collection" | "deleteCollection" => ("delete_collection", 1),
        "list_collections" | "listCollections" => ("list_collections", 0),
        "get_count" | "count" => ("get_count", 1),
        _ => return None,
    })
}

impl Command {
    /// Parse `args` (without the program name) into a command.
    ///
    /// # Errors
    ///
    /// * [`MemoryError::UnknownCommand`] for an unrecognised command word.
    /// * [`MemoryError::Arity`] when required arguments are missing.
    /// * [`MemoryError::InvalidArgument`] for a bad collection name or number.
    /// * [`MemoryError::MalformedToken`] / [`MemoryError::MalformedMetadata`]
    ///   when `add_memory` tokens do not decode.
    pub fn parse(args: &[String]) -> Result<Command, MemoryError> {
        let Some((word, rest)) = args.split_first() else {
            return Err(MemoryError::InvalidArgument("no command specified".into()));
        };
        let (name, required) =
            lookup(word).ok_or_else(|| MemoryError::UnknownCommand(word.clone()))?;
        if rest.len() < required {
            return Err(MemoryError::Arity {
                command: name.to_string(),
                expected: required,
                got: rest.len(),
            });
        }

        let arg = |i: usize| rest.get(i).map(String::as_str);
        let collection = |i: usize| -> Result<String, MemoryError> {
            let name = rest[i].as_str();
            validate_collection_name(name)?;
            Ok(name.to_string())
        };

        Ok(match name {
            "create_collection" => Command::CreateCollection {
                name: collection(0)?,
            },
            "add_memory" => {
                let collection = collection(0)?;
                let document = codec::decode_document(&rest[2])?;
                let metadata = match arg(3) {
                    Some(token) => codec::decode_metadata(token)?,
                    None => Metadata::new(),
                };
                Command::AddMemory {
                    collection,
                    record: MemoryRecord::new(rest[1].clone(), document, metadata),
                }
            }
            "query" => Command::Query {
                collection: collection(0)?,
                query_text: rest[1].clone(),
                limit: arg(2).map(parse_limit).transpose()?.unwrap_or(DEFAULT_LIMIT),
                predicate: filter::build(
                    arg(3).map(parse_min_importance).transpose()?.flatten(),
                    arg(4).and_then(parse_tier),
                ),
            },
            "get_by_id" => Command::GetById {
                collection: collection(0)?,
                id: rest[1].clone(),
            },
            "delete_collection" => Command::DeleteCollection {
                name: collection(0)?,
            },
            "list_collections" => Command::ListCollections,
            _ => Command::Count {
                collection: collection(0)?,
            },
        })
    }
}

fn parse_limit(raw: &str) -> Result<usize, MemoryError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(MemoryError::InvalidArgument(format!(
            "limit must be a positive integer, got {raw:?}"
        ))),
    }
}

/// `-1` (or `-1.0`) disables the constraint. Integers stay integers so the
/// filter compares like with like.
fn parse_min_importance(raw: &str) -> Result<Option<Number>, MemoryError> {
    let raw = raw.trim();
    if raw == NO_MIN_IMPORTANCE {
        return Ok(None);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Some(Number::from(i)));
    }
    let invalid =
        || MemoryError::InvalidArgument(format!("minImportance must be a number, got {raw:?}"));
    let f = raw.parse::<f64>().map_err(|_| invalid())?;
    if f == -1.0 {
        return Ok(None);
    }
    Number::from_f64(f).map(Some).ok_or_else(invalid)
}

/// Integer tiers match integer metadata; anything else is matched as text.
/// An empty argument means no tier constraint.
fn parse_tier(raw: &str) -> Option<MetadataValue> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Some(match raw.parse::<i64>() {
        Ok(i) => MetadataValue::Int(i),
        Err(_) => MetadataValue::Str(raw.to_string()),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

/// The single JSON object an invocation prints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Created {
        success: bool,
        name: String,
    },
    Added {
        success: bool,
    },
    Memories {
        success: bool,
        memories: Vec<QueryResultItem>,
    },
    Memory {
        success: bool,
        memory: Option<MemoryRecord>,
    },
    Deleted {
        success: bool,
        deleted: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Collections {
        success: bool,
        collections: Vec<String>,
    },
    Count {
        success: bool,
        count: usize,
    },
    CountMissing {
        error: String,
        count: usize,
    },
    Error {
        error: String,
    },
}

/// Body and exit status of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub body: Response,
    pub exit_code: i32,
}

impl Reply {
    fn ok(body: Response) -> Self {
        Self { body, exit_code: 0 }
    }

    pub fn from_error(err: &MemoryError) -> Self {
        Self {
            body: Response::Error {
                error: err.to_string(),
            },
            exit_code: if err.is_recoverable() { 0 } else { 1 },
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.body)
            .unwrap_or_else(|e| format!("{{\"error\":{:?}}}", e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Executes parsed commands against an injected store.
pub struct Dispatcher {
    store: Arc<dyn MemoryStore>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }

    /// Execute an already parsed command, converting every failure into a
    /// structured reply.
    pub async fn dispatch(&self, command: Command) -> Reply {
        debug!(?command, "dispatching");
        match self.execute(command).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "command failed");
                Reply::from_error(&e)
            }
        }
    }

    async fn execute(&self, command: Command) -> Result<Reply, MemoryError> {
        let store = self.store.as_ref();
        Ok(Reply::ok(match command {
            Command::CreateCollection { name } => {
                let handle = store.create_or_get_collection(&name).await?;
                Response::Created {
                    success: true,
                    name: handle.name,
                }
            }
            Command::AddMemory { collection, record } => {
                store.upsert(&collection, record).await?;
                Response::Added { success: true }
            }
            Command::Query {
                collection,
                query_text,
                limit,
                predicate,
            } => Response::Memories {
                success: true,
                memories: store
                    .query(&collection, &query_text, limit, predicate.as_ref())
                    .await?,
            },
            Command::GetById { collection, id } => Response::Memory {
                success: true,
                memory: store.get_by_id(&collection, &id).await?,
            },
            Command::DeleteCollection { name } => {
                let note = match store.delete_collection(&name).await? {
                    DeleteOutcome::Deleted => None,
                    DeleteOutcome::NotFound { note } => Some(note),
                };
                Response::Deleted {
                    success: true,
                    deleted: name,
                    note,
                }
            }
            Command::ListCollections => Response::Collections {
                success: true,
                collections: store.list_collections().await?,
            },
            Command::Count { collection } => match store.count(&collection).await? {
                CountOutcome::Counted(count) => Response::Count {
                    success: true,
                    count,
                },
                CountOutcome::Missing { error } => Response::CountMissing { error, count: 0 },
            },
        }))
    }
}
