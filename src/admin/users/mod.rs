pub mod handlers;
pub mod models;
pub mod repository;
pub mod templates;

// Re-export commonly used items
pub use handlers::{
    create_user, delete_many_users, delete_user, get_user, list_users, update_user,
};
pub use models::{
    AdminCreateUserRequest, AdminUpdateUserRequest, AdminUserResponse, DeleteManyUsersRequest,
    ListUsersQuery, ListUsersResponse, Pagination, Role, User, SUPER_ADMIN_CODE,
};
pub use repository::{AdminUserRepository, MutationOutcome, UpdateOutcome};
pub use templates::admin_users_list_handler;
