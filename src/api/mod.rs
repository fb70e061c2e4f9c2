pub mod announcement;
pub mod attendance;
pub mod calendar;
pub mod checklist;
pub mod instapulse;
pub mod leave_request;
pub mod project;
pub mod storyboard;
pub mod task;
pub mod users;
