pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const MIN_COOKING_TIME: i32 = 1;
pub const MIN_INGREDIENT_AMOUNT: i32 = 1;

pub const MAX_NAME_LENGTH: usize = 200;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_USER_FIELD_LENGTH: usize = 150;

/// Usernames that collide with fixed routes under `/users/`.
pub const RESERVED_USERNAMES: &[&str] = &["me"];

pub const SHOPPING_LIST_HEADER: &str = "Shopping list:";
pub const SHOPPING_LIST_FILENAME: &str = "shopping_cart.txt";

pub const IMAGE_DIRECTORY: &str = "recipes/images";
pub const IMAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// Request bodies carry base64 images, so the limit is generous.
pub const MAX_BODY_SIZE: u64 = 10 * 1024 * 1024;

pub const TAG_CACHE_KEY: &str = "tag-cache-key";
pub const INGREDIENT_CACHE_KEY: &str = "ingredient-cache-key";
