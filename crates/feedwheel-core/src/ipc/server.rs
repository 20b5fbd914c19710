//! IPC Server for the scheduler daemon
//!
//! Listens on a Unix socket and handles job submissions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::protocol::*;
use crate::catalog::FeedRepository;
use crate::feed::NewFeed;
use crate::scheduler::{tasks, SchedulerContext};
use crate::Result;

/// Maximum number of concurrent IPC requests to prevent connection pool exhaustion
const MAX_CONCURRENT_REQUESTS: usize = 10;

/// IPC Server that handles client connections
pub struct DaemonServer {
    ctx: SchedulerContext,
    socket_path: PathBuf,
    start_time: Instant,
    /// Semaphore to limit concurrent request processing
    request_semaphore: Arc<Semaphore>,
}

impl DaemonServer {
    pub fn new(ctx: SchedulerContext) -> Self {
        let socket_path = ctx.config.socket_path();
        Self {
            ctx,
            socket_path,
            start_time: Instant::now(),
            request_semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
        }
    }

    /// Run the IPC server
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        // Remove old socket file if exists
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on: {}", self.socket_path.display());

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let ctx = self.ctx.clone();
                            let start_time = self.start_time;
                            let semaphore = self.request_semaphore.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, ctx, start_time, semaphore).await {
                                    warn!("Error handling connection: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("IPC server shutting down");
                        break;
                    }
                }
            }
        }

        // Cleanup socket file
        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

async fn handle_connection(
    stream: UnixStream,
    ctx: SchedulerContext,
    start_time: Instant,
    semaphore: Arc<Semaphore>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // Connection closed
        }

        let _permit = semaphore.acquire().await.map_err(|e| {
            crate::Error::Other(format!("Failed to acquire semaphore: {}", e))
        })?;

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                debug!("Received request: {} (id: {})", request.method, request.id);
                handle_request(request, &ctx, start_time).await
            }
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                Response::error(Uuid::nil(), ERR_PARSE, format!("Parse error: {}", e))
            }
        };

        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

async fn handle_request(
    request: Request,
    ctx: &SchedulerContext,
    start_time: Instant,
) -> Response {
    let id = request.id;

    match request.method.as_str() {
        methods::PING => Response::success(id, serde_json::json!({"ok": true})),

        methods::STATUS => {
            let counts = match ctx.store.counts().await {
                Ok(counts) => counts,
                Err(e) => return Response::error(id, ERR_INTERNAL, e.to_string()),
            };
            let backlog = match ctx.store.backlog().await {
                Ok(backlog) => backlog,
                Err(e) => return Response::error(id, ERR_INTERNAL, e.to_string()),
            };
            Response::success(
                id,
                serde_json::json!({
                    "running": true,
                    "uptime_secs": start_time.elapsed().as_secs(),
                    "scheduled": counts.scheduled,
                    "pending": counts.pending,
                    "tasked": counts.tasked,
                    "backlog": backlog,
                }),
            )
        }

        methods::TICK_RUN => match tasks::schedule_tick(ctx).await {
            Ok(summary) => Response::success(
                id,
                serde_json::json!({
                    "promoted": summary.promoted,
                    "reclaimed": summary.reclaimed,
                    "regular": summary.regular,
                    "force": summary.force,
                    "stale": summary.stale,
                    "updated": summary.outcome.updated,
                    "failed": summary.outcome.failed,
                }),
            ),
            Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
        },

        methods::FEEDS_UPDATE => match serde_json::from_value::<FeedIdsParams>(request.params) {
            Ok(params) => match tasks::update_feeds(ctx, &params.feed_ids).await {
                Ok(outcome) => Response::success(
                    id,
                    serde_json::json!({
                        "updated": outcome.updated,
                        "skipped": outcome.skipped,
                        "missing": outcome.missing,
                        "failed": outcome.failed,
                    }),
                ),
                Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
            },
            Err(e) => Response::error(id, ERR_INVALID_PARAMS, e.to_string()),
        },

        methods::FEEDS_NEW => match serde_json::from_value::<FeedIdsParams>(request.params) {
            Ok(params) => match tasks::new_feeds(ctx, &params.feed_ids).await {
                Ok(outcome) => Response::success(
                    id,
                    serde_json::json!({
                        "updated": outcome.updated,
                        "skipped": outcome.skipped,
                        "missing": outcome.missing,
                        "failed": outcome.failed,
                    }),
                ),
                Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
            },
            Err(e) => Response::error(id, ERR_INVALID_PARAMS, e.to_string()),
        },

        methods::FEED_PUSH => match serde_json::from_value::<PushParams>(request.params) {
            Ok(params) => {
                let content = Bytes::from(params.content.into_bytes());
                match tasks::push_update(ctx, params.feed_id, content).await {
                    Ok(outcome) => Response::success(
                        id,
                        serde_json::json!({ "entries": outcome.entries }),
                    ),
                    Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
                }
            }
            Err(e) => Response::error(id, ERR_INVALID_PARAMS, e.to_string()),
        },

        methods::FEEDS_SCHEDULE_IMMEDIATE => {
            match serde_json::from_value::<FeedIdsParams>(request.params) {
                Ok(params) => match tasks::schedule_immediate(ctx, &params.feed_ids).await {
                    Ok(()) => Response::ok(id),
                    Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
                },
                Err(e) => Response::error(id, ERR_INVALID_PARAMS, e.to_string()),
            }
        }

        methods::FEEDS_PREMIUM_SETUP => {
            match serde_json::from_value::<FeedIdsParams>(request.params) {
                Ok(params) => match tasks::premium_setup(ctx, &params.feed_ids).await {
                    Ok(updated) => {
                        Response::success(id, serde_json::json!({ "updated": updated }))
                    }
                    Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
                },
                Err(e) => Response::error(id, ERR_INVALID_PARAMS, e.to_string()),
            }
        }

        methods::FEED_ADD => match serde_json::from_value::<FeedAddParams>(request.params) {
            Ok(params) => {
                let repo = FeedRepository::new(&ctx.db);
                let new_feed = NewFeed {
                    url: params.url,
                    title: params.title,
                };
                match repo.create(&new_feed).await {
                    Ok(feed) => Response::success(id, serde_json::json!({ "feed": feed })),
                    Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
                }
            }
            Err(e) => Response::error(id, ERR_INVALID_PARAMS, e.to_string()),
        },

        methods::FEED_LIST => {
            let repo = FeedRepository::new(&ctx.db);
            match repo.list_all().await {
                Ok(feeds) => Response::success(id, serde_json::json!({ "feeds": feeds })),
                Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
            }
        }

        _ => Response::error(id, ERR_METHOD_NOT_FOUND, "Method not found"),
    }
}
