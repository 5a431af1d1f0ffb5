// Server configuration
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: &str = "3000";
pub const DEFAULT_DATA_PATH: &str = "data";
pub const DEFAULT_UTC_OFFSET: &str = "+00:00";
pub const DATABASE_FILE: &str = "expenses.db";

// Session configuration
pub const SESSION_NAME: &str = "expense_session";
pub const SESSION_EXPIRY_DAYS: i64 = 30;
pub const MIN_SESSION_SECRET_LENGTH: usize = 64;
pub const SESSION_USER_ID: &str = "user_id";
pub const SESSION_USERNAME: &str = "username";

// Groups
pub const PERSONAL_GROUP_NAME: &str = "Personal Expenses";
pub const SELECTED_GROUP_KEY: &str = "selected-group-id";

// Live feed
pub const FEED_CHANGE_CAPACITY: usize = 256;
pub const FEED_SNAPSHOT_BUFFER: usize = 16;
pub const RECENT_TRANSACTIONS_PREVIEW: usize = 3;

// Push notifications
pub const PUSH_NOTIFICATION_TITLE: &str = "Expense Tracker";
pub const PUSH_NOTIFICATION_ICON: &str = "/icon.png";

// Validation limits
pub const MAX_GROUP_NAME_LENGTH: usize = 100;
pub const MAX_CATEGORY_LENGTH: usize = 100;
pub const MAX_SEGREGATION_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 255;
pub const MAX_SOURCE_LENGTH: usize = 100;
pub const MAX_PUSH_MESSAGE_LENGTH: usize = 500;
pub const MAX_ENDPOINT_LENGTH: usize = 2048;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_USERNAME_LENGTH: usize = 4;
pub const MIN_PASSWORD_LENGTH: usize = 6;

// Error messages
pub const ERR_DATABASE_ACCESS: &str = "Database access error";
pub const ERR_DATABASE_OPERATION: &str = "Database operation failed";
pub const ERR_UNAUTHORIZED: &str = "Not logged in";
pub const ERR_FEED_UNAVAILABLE: &str = "Failed to load group expenses. Please try again.";
