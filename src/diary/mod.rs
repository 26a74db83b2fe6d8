//! 日记领域的纯逻辑（不发请求）

pub mod calendar;
pub mod consistency;

pub use calendar::DayStatus;
pub use consistency::{is_same_diary_inputs, normalize, DiaryInputPair};
