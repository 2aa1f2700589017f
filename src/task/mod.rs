//! 任务阶段机模块：形态分类、阶段推断与覆盖合成

pub mod machine;
pub mod phase;

pub use machine::{Decision, Task};
pub use phase::{Phase, TaskShape};
