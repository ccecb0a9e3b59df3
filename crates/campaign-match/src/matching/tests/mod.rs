mod allocation;
mod common;
mod grading;
mod leaderboard;
