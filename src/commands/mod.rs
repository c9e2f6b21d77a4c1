// Convergence commands
pub mod converge;

// Daemon inspection
pub mod info;
