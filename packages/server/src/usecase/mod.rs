//! UseCase 層
//!
//! ビジネスロジックを実装するレイヤー。
//! UI 層から呼び出され、Domain 層を操作します。

pub mod error;
pub mod fetch_history;
pub mod join_room;
pub mod open_connection;
pub mod register_user;
pub mod send_message;

pub use error::{ConnectError, HistoryError, SendMessageError, SubscriptionError};
pub use fetch_history::{AuthenticateUseCase, FetchHistoryUseCase, HistoryRequest};
pub use join_room::JoinRoomUseCase;
pub use open_connection::{CloseConnectionUseCase, OpenConnectionUseCase};
pub use register_user::RegisterUserUseCase;
pub use send_message::{PublishOrder, SendMessageCommand, SendMessageUseCase, SendOutcome};
