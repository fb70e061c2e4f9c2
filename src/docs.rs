use crate::api::announcement::CreateAnnouncement;
use crate::api::calendar::{DayCapacity, Forecast, ForecastSummary};
use crate::api::checklist::{
    AssignChecklist, AssignedChecklist, ChecklistStatusUpdate, TemplatePayload, TemplateResponse, TemplateSummary,
    TemplateTaskInput,
};
use crate::api::instapulse::{
    AddPage, ReelSort, ReelTally, SaveResultPayload, SaveResultResponse, SavedPage, ScrapedPage, ScrapedReel,
};
use crate::api::leave_request::{CreateLeave, LeaveResponse, ReviewLeave};
use crate::api::project::CreateProject;
use crate::api::storyboard::{CreateStory, CreateStoryType, UpdateStory};
use crate::api::task::{CreateTask, UpdateTask};
use crate::api::users::{CreateUser, UpdateUser};
use crate::auth::handlers::LoginResponse;
use crate::model::announcement::Announcement;
use crate::model::attendance::Attendance;
use crate::model::checklist::{ChecklistStatus, ChecklistTemplateTask, EmployeeChecklist};
use crate::model::instagram::{InstagramReel, TrackedInstagramPage};
use crate::model::leave_request::{LeaveStatus, LeaveType, ReviewDecision};
use crate::model::role::Role;
use crate::model::story::{Story, StoryStatus, StoryType};
use crate::model::task::{Project, Task, TaskBoard, TaskStatus};
use crate::model::user::UserResponse;
use crate::models::LoginReqDto;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shabra OS API",
        version = "1.0.0",
        description = r#"
## Shabra OS

Operations backend for a Persian creative agency.

### 🔹 Modules
- **Users** and roles (ADMIN, MANAGER, EMPLOYEE)
- **Attendance**: clock in / clock out
- **Leave**: requests, review, cancellation
- **Checklists**: templates that generate tasks when assigned
- **Projects & Tasks**: Kanban board (`Todo`, `InProgress`, `Done`)
- **Storyboard**: daily story planning by type
- **InstaPulse**: tracked Instagram pages and reels, fed by an n8n webhook
- **Calendar**: team capacity forecast from approved leave
- **Announcements**

### 🔐 Security
Session endpoints use **JWT Bearer** access tokens from `/auth/login`.
The InstaPulse webhook uses a static bearer secret.

### 📦 Response Format
- JSON, camelCase fields
- Errors: `{ "message": ..., "details"?: ... }`
- List endpoints return `{ data, page, perPage, total, totalPages }`
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::users::create_user,
        crate::api::users::list_users,
        crate::api::users::me,
        crate::api::users::get_user,
        crate::api::users::update_user,

        crate::api::attendance::clock_in,
        crate::api::attendance::clock_out,
        crate::api::attendance::attendance_status,
        crate::api::attendance::list_attendance,

        crate::api::leave_request::create_leave,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::review_leave,
        crate::api::leave_request::cancel_leave,

        crate::api::checklist::create_template,
        crate::api::checklist::list_templates,
        crate::api::checklist::get_template,
        crate::api::checklist::update_template,
        crate::api::checklist::delete_template,
        crate::api::checklist::assign_checklist,
        crate::api::checklist::list_employee_checklists,
        crate::api::checklist::update_checklist_status,

        crate::api::project::create_project,
        crate::api::project::list_projects,

        crate::api::task::create_task,
        crate::api::task::list_tasks,
        crate::api::task::task_board,
        crate::api::task::update_task,
        crate::api::task::delete_task,

        crate::api::storyboard::create_story_type,
        crate::api::storyboard::list_story_types,
        crate::api::storyboard::delete_story_type,
        crate::api::storyboard::create_story,
        crate::api::storyboard::list_stories,
        crate::api::storyboard::update_story,
        crate::api::storyboard::delete_story,

        crate::api::instapulse::add_page,
        crate::api::instapulse::list_pages,
        crate::api::instapulse::delete_page,
        crate::api::instapulse::list_reels,
        crate::api::instapulse::save_result,

        crate::api::calendar::capacity_forecast,

        crate::api::announcement::create_announcement,
        crate::api::announcement::list_announcements,
        crate::api::announcement::delete_announcement
    ),
    components(
        schemas(
            LoginReqDto,
            LoginResponse,
            Role,
            CreateUser,
            UpdateUser,
            UserResponse,
            Attendance,
            LeaveType,
            LeaveStatus,
            ReviewDecision,
            CreateLeave,
            ReviewLeave,
            LeaveResponse,
            ChecklistStatus,
            ChecklistTemplateTask,
            EmployeeChecklist,
            TemplateTaskInput,
            TemplatePayload,
            TemplateResponse,
            TemplateSummary,
            AssignChecklist,
            AssignedChecklist,
            ChecklistStatusUpdate,
            TaskStatus,
            Task,
            TaskBoard,
            CreateTask,
            UpdateTask,
            Project,
            CreateProject,
            StoryStatus,
            StoryType,
            Story,
            CreateStoryType,
            CreateStory,
            UpdateStory,
            TrackedInstagramPage,
            InstagramReel,
            AddPage,
            ReelSort,
            ScrapedPage,
            ScrapedReel,
            SaveResultPayload,
            SavedPage,
            ReelTally,
            SaveResultResponse,
            DayCapacity,
            ForecastSummary,
            Forecast,
            Announcement,
            CreateAnnouncement
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login and token rotation"),
        (name = "Users", description = "User and role management"),
        (name = "Attendance", description = "Clock in / clock out"),
        (name = "Leave", description = "Leave requests and review"),
        (name = "Checklists", description = "Checklist templates and assignments"),
        (name = "Projects", description = "Projects"),
        (name = "Tasks", description = "Tasks and Kanban board"),
        (name = "Storyboard", description = "Story types and daily stories"),
        (name = "InstaPulse", description = "Instagram reel tracking"),
        (name = "Calendar", description = "Team capacity forecast"),
        (name = "Announcements", description = "Company announcements"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "webhook_token",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_module() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;

        for path in [
            "/auth/login",
            "/api/leave-requests/{leave_id}/review",
            "/api/checklists/assign",
            "/api/tasks/board",
            "/api/instapulse/save-result",
            "/api/calendar/forecast",
        ] {
            assert!(paths.contains_key(path), "missing {}", path);
        }

        let schemes = &doc.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("bearer_auth"));
        assert!(schemes.contains_key("webhook_token"));
    }
}
