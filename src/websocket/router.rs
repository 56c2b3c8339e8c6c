//! 消息路由
//!
//! 把已认证连接上的一条文本帧分派到对应的处理逻辑。
//! 任何失败都以 `error` 帧回复，不会关闭连接。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;

use super::connection::{ConnectionState, FrameSink};
use super::protocol::{
    ChatMessageData, InboundFrame, OutboundFrame, ProtocolError, StreamRequestData,
};
use super::streaming::{StreamJob, StreamingSession};
use crate::config::StreamingConfig;
use crate::generation::{GenerationContext, Generator};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("no chat id")]
    NoChatId,
    #[error("A stream is already in progress")]
    StreamBusy,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub struct MessageRouter {
    generator: Arc<dyn Generator>,
    streaming: StreamingConfig,
}

impl MessageRouter {
    pub fn new(generator: Arc<dyn Generator>, streaming: StreamingConfig) -> Self {
        Self {
            generator,
            streaming,
        }
    }

    /// 处理一条文本帧
    ///
    /// 流式请求在后台任务中执行，本函数只负责启动，不等待其完成。
    pub fn dispatch(&self, conn: &Arc<ConnectionState>, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("[WS] 连接 {} 收到无法解析的帧: {}", conn.short_id(), e);
                conn.send_frame(OutboundFrame::error(e.to_string()));
                return;
            }
        };

        let result = match frame {
            InboundFrame::Ping => {
                conn.send_frame(OutboundFrame::pong());
                Ok(())
            }
            request => self.start_stream(conn, request),
        };

        if let Err(e) = result {
            conn.send_frame(OutboundFrame::error(e.to_string()));
        }
    }

    /// 启动一次流式会话
    ///
    /// 先检查聊天会话绑定，通过后才解码请求负载。
    fn start_stream(
        &self,
        conn: &Arc<ConnectionState>,
        request: InboundFrame,
    ) -> Result<(), RouterError> {
        let chat_id = conn.chat_id().ok_or(RouterError::NoChatId)?.to_string();
        let (job, extra) = match request {
            InboundFrame::ChatMessage(data) => {
                let data = ChatMessageData::decode(data)?;
                (StreamJob::Chat { prompt: data.content }, data.context)
            }
            InboundFrame::StreamRequest(data) => {
                let data = StreamRequestData::decode(data)?;
                (StreamJob::Code { prompt: data.prompt }, data.context)
            }
            InboundFrame::Ping => return Ok(()),
        };

        let mut session = StreamingSession::new(&self.streaming);
        let message_id = session.message_id().to_string();
        if !conn.begin_stream(&message_id, session.cancel_token()) {
            return Err(RouterError::StreamBusy);
        }

        let ctx = GenerationContext {
            user_id: conn.user_id.clone(),
            chat_id: Some(chat_id),
            app_id: conn.app_id().map(str::to_string),
            extra,
        };
        let generator = self.generator.clone();
        let conn = conn.clone();

        tracing::debug!(
            "[WS] 连接 {} 开始流式会话 {}",
            conn.short_id(),
            message_id
        );

        tokio::spawn(async move {
            let run = session.run(generator.as_ref(), job, &ctx, conn.as_ref());
            match AssertUnwindSafe(run).catch_unwind().await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        "[WS] 连接 {} 的流式会话 {} 失败: {}",
                        conn.short_id(),
                        message_id,
                        e
                    );
                    conn.finish_stream(&message_id);
                    conn.send_frame(OutboundFrame::error(e.client_message()));
                }
                Err(_) => {
                    tracing::error!(
                        "[WS] 连接 {} 的流式会话 {} 异常终止",
                        conn.short_id(),
                        message_id
                    );
                    conn.finish_stream(&message_id);
                    conn.send_frame(OutboundFrame::error("Internal error"));
                }
            }
            conn.finish_stream(&message_id);
        });

        Ok(())
    }
}
