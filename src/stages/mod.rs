pub mod stage0_segment;
pub mod stage1_retranscribe;
pub mod stage2_repair;
pub mod stage3_conform;

pub use stage0_segment::*;
pub use stage1_retranscribe::*;
pub use stage2_repair::*;
pub use stage3_conform::*;
