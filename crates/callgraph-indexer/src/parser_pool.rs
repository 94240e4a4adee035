//! Thread-backed pool of tree-sitter Rust parsers
//!
//! `tree_sitter::Parser` is neither `Send` nor `Sync`, so each worker thread
//! owns one parser and requests reach it over a channel. Callers on any
//! thread (rayon workers included) block until their tree comes back.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use tree_sitter::{Language, Parser, Tree};

/// A parsing request sent to the parser pool
#[derive(Debug)]
pub struct ParseRequest {
    pub content: String,
    pub path: PathBuf,
}

/// Result of a parsing operation
#[derive(Debug)]
pub struct ParseResult {
    pub tree: Tree,
    pub path: PathBuf,
    pub content: String,
}

impl ParseResult {
    pub fn source(&self) -> &[u8] {
        self.content.as_bytes()
    }
}

/// Internal message for the parser worker
struct WorkerRequest {
    request: ParseRequest,
    response_sender: Sender<Result<ParseResult>>,
}

/// Thread-safe parser pool
#[derive(Clone)]
pub struct ParserPool {
    sender: Arc<Mutex<Sender<WorkerRequest>>>,
}

impl std::fmt::Debug for ParserPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserPool").finish_non_exhaustive()
    }
}

pub fn rust_language() -> Language {
    tree_sitter_rust::LANGUAGE.into()
}

impl ParserPool {
    /// Create a new parser pool with the specified number of worker threads
    pub fn new(num_workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<WorkerRequest>();
        let receiver = Arc::new(Mutex::new(receiver));

        for i in 0..num_workers.max(1) {
            let receiver = Arc::clone(&receiver);
            std::thread::spawn(move || {
                Self::worker_thread(i, receiver);
            });
        }

        Self {
            sender: Arc::new(Mutex::new(sender)),
        }
    }

    /// Worker thread function that processes parsing requests
    fn worker_thread(worker_id: usize, receiver: Arc<Mutex<Receiver<WorkerRequest>>>) {
        tracing::debug!("Parser worker {} started", worker_id);

        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&rust_language()) {
            tracing::error!("Parser worker {} cannot load the Rust grammar: {}", worker_id, e);
            return;
        }

        loop {
            let next = match receiver.lock() {
                Ok(receiver) => receiver.recv(),
                Err(_) => break,
            };
            let Ok(WorkerRequest {
                request,
                response_sender,
            }) = next
            else {
                tracing::debug!("Parser worker {} shutting down", worker_id);
                break;
            };

            let result = match parser.parse(&request.content, None) {
                Some(tree) => Ok(ParseResult {
                    tree,
                    path: request.path,
                    content: request.content,
                }),
                None => Err(anyhow!("failed to parse {}", request.path.display())),
            };

            if response_sender.send(result).is_err() {
                tracing::warn!("Failed to send parse result back to caller");
            }
        }
    }

    /// Parse content, blocking the current thread until a worker is done.
    pub fn parse_blocking(&self, request: ParseRequest) -> Result<ParseResult> {
        let (response_sender, response_receiver) = mpsc::channel();

        self.sender
            .lock()
            .map_err(|_| anyhow!("Parser pool is poisoned"))?
            .send(WorkerRequest {
                request,
                response_sender,
            })
            .map_err(|_| anyhow!("Parser pool is shut down"))?;

        response_receiver
            .recv()
            .map_err(|_| anyhow!("Parser worker died"))?
    }
}

/// Pool sized to the number of CPUs, at least 2 workers.
pub fn create_parser_pool() -> ParserPool {
    let num_workers = std::thread::available_parallelism()
        .map(|n| n.get().max(2))
        .unwrap_or(2);

    ParserPool::new(num_workers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rust() {
        let pool = ParserPool::new(1);
        let content = r#"
fn main() {
    println!("Hello, world!");
}
"#
        .to_string();

        let request = ParseRequest {
            content,
            path: PathBuf::from("test.rs"),
        };

        let result = pool.parse_blocking(request).unwrap();
        assert_eq!(result.tree.root_node().kind(), "source_file");
        assert_eq!(result.path, PathBuf::from("test.rs"));
    }

    #[test]
    fn test_pool_is_usable_from_many_threads() {
        let pool = create_parser_pool();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let request = ParseRequest {
                        content: format!("fn f{}() {{}}", i),
                        path: PathBuf::from(format!("f{}.rs", i)),
                    };
                    pool.parse_blocking(request).map(|r| r.tree.root_node().named_child_count())
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 1);
        }
    }
}
