pub mod order;
pub mod push_token;
pub mod ticket;
pub mod transfer;
pub mod user;

pub use order::{NewOrder, Order, OrderStatus};
pub use push_token::PushToken;
pub use ticket::{IllegalTransition, NewTicket, Ticket, TicketStats, TicketStatus, Transition};
pub use transfer::TicketTransfer;
pub use user::{UserRole, UserSummary};
