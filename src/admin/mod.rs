pub mod error;
pub mod session;
pub mod users;
pub mod validation;

// Re-export commonly used items
pub use error::AdminApiError;
pub use session::{login, logout, require_admin, AdminSession, LoginRequest};
pub use users::{
    admin_users_list_handler, create_user, delete_many_users, delete_user, get_user, list_users,
    update_user, AdminUserRepository, AdminUserResponse,
};
