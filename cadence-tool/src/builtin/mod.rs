mod exit_loop;

pub use exit_loop::ExitLoopTool;
