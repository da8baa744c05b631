//! 类型系统模块：对话消息与图像内容。
//!
//! # Types Module
//!
//! Core conversation types shared by the query builder, the provider drivers
//! and the response cache.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | One conversation turn: role plus optional text and image |
//! | [`MessageRole`] | system, user or assistant |
//! | [`ImageContent`] | Inline image as mime type + base64 payload |

pub mod message;

pub use message::{ImageContent, Message, MessageRole};
