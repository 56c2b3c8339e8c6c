//! 流式会话
//!
//! 先从生成服务拿到完整结果，再切分成有序的分块逐个发送，最后发送一条终止帧。
//! 终止帧中的完整文本恰好等于所有分块内容按发送顺序的拼接。
//!
//! ```text
//! Idle ──generate──▶ Emitting ──▶ Completed
//!   │                  │
//!   └──────────────────┴──▶ Errored / Cancelled
//! ```

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::connection::FrameSink;
use super::protocol::{ChunkData, CodeCompleteData, OutboundFrame, StreamCompleteData};
use crate::config::StreamingConfig;
use crate::generation::{GeneratedFile, GenerationContext, GenerationError, Generator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Emitting,
    Completed,
    Errored,
    Cancelled,
}

/// 要执行的生成任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamJob {
    /// 聊天回复，输出 `stream_chunk` / `stream_complete`
    Chat { prompt: String },
    /// 代码生成，输出 `code_stream` / `code_complete`
    Code { prompt: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed { chunks: usize },
    Cancelled { chunks_sent: usize },
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream session already started")]
    AlreadyStarted,
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("connection closed while streaming")]
    ConnectionClosed,
}

impl StreamError {
    /// 发给客户端的提示，不包含内部细节
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::AlreadyStarted => "A stream is already in progress",
            Self::Generation(GenerationError::EmptyPrompt) => "Prompt must not be empty",
            Self::Generation(_) => "Failed to generate response",
            Self::ConnectionClosed => "Connection closed",
        }
    }
}

pub struct StreamingSession {
    message_id: String,
    state: StreamState,
    chunk_chars: usize,
    pacing: Duration,
    cancel: CancellationToken,
}

impl StreamingSession {
    pub fn new(config: &StreamingConfig) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            state: StreamState::Idle,
            chunk_chars: config.chunk_chars.max(1),
            pacing: Duration::from_millis(config.chunk_delay_ms),
            cancel: CancellationToken::new(),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// 取消句柄：触发后不再发送分块，也不发送终止帧
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(
        &mut self,
        generator: &dyn Generator,
        job: StreamJob,
        ctx: &GenerationContext,
        sink: &dyn FrameSink,
    ) -> Result<StreamOutcome, StreamError> {
        if self.state != StreamState::Idle {
            return Err(StreamError::AlreadyStarted);
        }

        let (is_code, text, files) = match self.generate(generator, &job, ctx).await {
            Ok(result) => result,
            Err(e) => {
                self.state = StreamState::Errored;
                return Err(e.into());
            }
        };

        if self.cancel.is_cancelled() {
            self.state = StreamState::Cancelled;
            return Ok(StreamOutcome::Cancelled { chunks_sent: 0 });
        }

        self.state = StreamState::Emitting;
        let chunks = split_into_chunks(&text, self.chunk_chars);
        let total = chunks.len();

        for (sent, chunk) in chunks.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(sent));
            }
            let data = ChunkData {
                message_id: self.message_id.clone(),
                content: chunk.to_string(),
                done: false,
            };
            let frame = if is_code {
                OutboundFrame::CodeStream(data)
            } else {
                OutboundFrame::StreamChunk(data)
            };
            if !sink.send_frame(frame) {
                self.state = StreamState::Errored;
                return Err(StreamError::ConnectionClosed);
            }
            if !self.pace().await {
                return Ok(self.cancelled(sent + 1));
            }
        }

        let terminal = if is_code {
            OutboundFrame::CodeComplete(CodeCompleteData {
                message_id: self.message_id.clone(),
                code: text,
                files,
                done: true,
            })
        } else {
            OutboundFrame::StreamComplete(StreamCompleteData {
                message_id: self.message_id.clone(),
                content: text,
                done: true,
            })
        };
        if !sink.send_frame(terminal) {
            self.state = StreamState::Errored;
            return Err(StreamError::ConnectionClosed);
        }

        self.state = StreamState::Completed;
        tracing::debug!(
            "[Stream] 会话 {} 完成，共 {} 个分块",
            self.message_id,
            total
        );
        Ok(StreamOutcome::Completed { chunks: total })
    }

    async fn generate(
        &self,
        generator: &dyn Generator,
        job: &StreamJob,
        ctx: &GenerationContext,
    ) -> Result<(bool, String, Vec<GeneratedFile>), GenerationError> {
        match job {
            StreamJob::Chat { prompt } => {
                let text = generator.chat(prompt, ctx).await?;
                Ok((false, text, Vec::new()))
            }
            StreamJob::Code { prompt } => {
                let generated = generator.code(prompt, ctx).await?;
                Ok((true, generated.code, generated.files))
            }
        }
    }

    /// 分块之间的间隔，期间被取消则返回 false
    async fn pace(&self) -> bool {
        if self.pacing.is_zero() {
            tokio::task::yield_now().await;
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.pacing) => true,
        }
    }

    fn cancelled(&mut self, chunks_sent: usize) -> StreamOutcome {
        self.state = StreamState::Cancelled;
        tracing::debug!(
            "[Stream] 会话 {} 已取消，已发送 {} 个分块",
            self.message_id,
            chunks_sent
        );
        StreamOutcome::Cancelled { chunks_sent }
    }
}

/// 按单词边界把文本切成不超过 `max_chars` 个字符的分块
///
/// 分块是原文的连续切片，按顺序拼接即为原文；超长单词按字符边界切开。
/// 空文本返回单个空分块，保证分块序列非空。
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    if text.is_empty() {
        return vec![""];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    let mut offset = 0;

    for piece in text.split_inclusive(char::is_whitespace) {
        let piece_chars = piece.chars().count();
        if count > 0 && count + piece_chars > max_chars {
            chunks.push(&text[start..offset]);
            start = offset;
            count = 0;
        }
        if piece_chars > max_chars {
            let mut taken = 0;
            for (i, _) in piece.char_indices() {
                if taken == max_chars {
                    chunks.push(&text[start..offset + i]);
                    start = offset + i;
                    taken = 0;
                }
                taken += 1;
            }
            count = taken;
        } else {
            count += piece_chars;
        }
        offset += piece.len();
    }

    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}
