//! Payload validation for the write endpoints.
//!
//! Extraction ([`RecipeDraft::from_form`]) records type errors, then every
//! validator in [`RECIPE_VALIDATORS`] runs over whatever was extracted. All
//! messages end up in one [`FieldErrors`] so the client sees every broken
//! field at once. Nothing here touches the database; reference checks for
//! tag and ingredient ids live next to the queries in `actions::recipes`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    constants::{
        MAX_EMAIL_LENGTH, MAX_NAME_LENGTH, MAX_USER_FIELD_LENGTH, MIN_COOKING_TIME,
        MIN_INGREDIENT_AMOUNT, RESERVED_USERNAMES,
    },
    media::{decode_data_uri, DecodedImage},
};

use super::{
    error::{ApiError, FieldErrors},
    form::{integer_from_value, Form, REQUIRED},
    schema::Id,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationRules {
    pub min_cooking_time: i32,
    pub min_ingredient_amount: i32,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_cooking_time: MIN_COOKING_TIME,
            min_ingredient_amount: MIN_INGREDIENT_AMOUNT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientAmount {
    pub id: Id,
    pub amount: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePolicy {
    Required,
    Optional,
}

#[derive(Debug, Default)]
pub struct RecipeDraft {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<DecodedImage>,
    pub tags: Option<Vec<Id>>,
    pub ingredients: Option<Vec<IngredientAmount>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipePayload {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: Option<DecodedImage>,
    pub tags: Vec<Id>,
    pub ingredients: Vec<IngredientAmount>,
}

pub type RecipeValidator = fn(&RecipeDraft, &ValidationRules, &mut FieldErrors);

pub const RECIPE_VALIDATORS: &[RecipeValidator] = &[
    validate_name,
    validate_text,
    validate_cooking_time,
    validate_tags,
    validate_ingredients,
];

impl RecipeDraft {
    pub fn from_form(form: &Form, image: ImagePolicy, errors: &mut FieldErrors) -> Self {
        let image = match image {
            ImagePolicy::Required => form.get_str("image", errors),
            ImagePolicy::Optional => form.get_optional_str("image", errors),
        }
        .and_then(|value| match decode_data_uri(&value) {
            Ok(image) => Some(image),
            Err(message) => {
                errors.add("image", message);
                None
            }
        });

        Self {
            name: form.get_str("name", errors),
            text: form.get_str("text", errors),
            cooking_time: form.get_number("cooking_time", errors),
            image,
            tags: form.get_id_list("tags", errors),
            ingredients: form
                .get_list("ingredients", errors)
                .and_then(|values| parse_ingredient_list(values, errors)),
        }
    }

    pub fn validate(&self, rules: &ValidationRules, errors: &mut FieldErrors) {
        RECIPE_VALIDATORS
            .iter()
            .for_each(|validator| validator(self, rules, errors));
    }

    /// Fails with every collected error, or hands out the checked payload.
    pub fn into_payload(self, errors: FieldErrors) -> Result<RecipePayload, ApiError> {
        errors.into_result()?;

        match (
            self.name,
            self.text,
            self.cooking_time,
            self.tags,
            self.ingredients,
        ) {
            (Some(name), Some(text), Some(cooking_time), Some(tags), Some(ingredients)) => {
                Ok(RecipePayload {
                    name: name.trim().to_owned(),
                    text,
                    cooking_time,
                    image: self.image,
                    tags,
                    ingredients,
                })
            }
            _ => Err(ApiError::Internal(String::from(
                "Recipe draft incomplete without field errors",
            ))),
        }
    }
}

fn parse_ingredient_list(values: &[Value], errors: &mut FieldErrors) -> Option<Vec<IngredientAmount>> {
    let parsed: Option<Vec<IngredientAmount>> = values
        .iter()
        .map(|value| {
            let id = value.get("id").and_then(integer_from_value::<Id>)?;
            let amount = value.get("amount").and_then(integer_from_value::<i32>)?;
            Some(IngredientAmount { id, amount })
        })
        .collect();

    if parsed.is_none() {
        errors.add("ingredients", "Each ingredient needs an integer id and amount");
    }
    parsed
}

fn has_duplicates<T: Eq + std::hash::Hash>(values: impl IntoIterator<Item = T>) -> bool {
    let mut seen = HashSet::new();
    !values.into_iter().all(|value| seen.insert(value))
}

pub fn validate_name(draft: &RecipeDraft, _rules: &ValidationRules, errors: &mut FieldErrors) {
    if let Some(name) = &draft.name {
        if name.trim().is_empty() {
            errors.add("name", "Name must contain at least one character");
        } else if name.trim().chars().count() > MAX_NAME_LENGTH {
            errors.add(
                "name",
                format!("Ensure this field has no more than {MAX_NAME_LENGTH} characters"),
            );
        }
    }
}

pub fn validate_text(draft: &RecipeDraft, _rules: &ValidationRules, errors: &mut FieldErrors) {
    if let Some(text) = &draft.text {
        if text.trim().is_empty() {
            errors.add("text", "This field may not be blank");
        }
    }
}

pub fn validate_cooking_time(draft: &RecipeDraft, rules: &ValidationRules, errors: &mut FieldErrors) {
    if let Some(cooking_time) = draft.cooking_time {
        if cooking_time < rules.min_cooking_time {
            errors.add(
                "cooking_time",
                format!(
                    "Cooking time must be at least {} minute(s)",
                    rules.min_cooking_time
                ),
            );
        }
    }
}

pub fn validate_tags(draft: &RecipeDraft, _rules: &ValidationRules, errors: &mut FieldErrors) {
    if let Some(tags) = &draft.tags {
        if tags.is_empty() {
            errors.add("tags", "A recipe needs at least one tag");
        }
        if has_duplicates(tags) {
            errors.add("tags", "Tags must not repeat");
        }
    }
}

pub fn validate_ingredients(draft: &RecipeDraft, rules: &ValidationRules, errors: &mut FieldErrors) {
    if let Some(ingredients) = &draft.ingredients {
        if ingredients.is_empty() {
            errors.add("ingredients", "A recipe needs at least one ingredient");
        }
        if has_duplicates(ingredients.iter().map(|ingredient| ingredient.id)) {
            errors.add("ingredients", "Ingredients must not repeat");
        }
        if ingredients
            .iter()
            .any(|ingredient| ingredient.amount < rules.min_ingredient_amount)
        {
            errors.add(
                "ingredients",
                format!(
                    "Ingredient amount must be at least {}",
                    rules.min_ingredient_amount
                ),
            );
        }
    }
}

// Users

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl Registration {
    pub fn from_form(form: &Form) -> Result<Self, ApiError> {
        let mut errors = FieldErrors::new();

        let email = form.get_str("email", &mut errors).map(|e| e.trim().to_owned());
        let username = form.get_str("username", &mut errors).map(|u| u.trim().to_owned());
        let first_name = form.get_str("first_name", &mut errors);
        let last_name = form.get_str("last_name", &mut errors);
        let password = form.get_str("password", &mut errors);

        if let Some(email) = &email {
            validate_email(email, &mut errors);
        }
        if let Some(username) = &username {
            validate_username(username, &mut errors);
        }
        for (field, value) in [("first_name", &first_name), ("last_name", &last_name)] {
            if let Some(value) = value {
                validate_display_name(field, value, &mut errors);
            }
        }
        if let Some(password) = &password {
            validate_password("password", password, &mut errors);
        }

        errors.into_result()?;

        match (email, username, first_name, last_name, password) {
            (Some(email), Some(username), Some(first_name), Some(last_name), Some(password)) => {
                Ok(Self {
                    email,
                    username,
                    first_name: first_name.trim().to_owned(),
                    last_name: last_name.trim().to_owned(),
                    password,
                })
            }
            _ => Err(ApiError::field("non_field_errors", REQUIRED)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn from_form(form: &Form) -> Result<Self, ApiError> {
        let mut errors = FieldErrors::new();
        let email = form.get_str("email", &mut errors);
        let password = form.get_str("password", &mut errors);
        errors.into_result()?;

        match (email, password) {
            (Some(email), Some(password)) => Ok(Self {
                email: email.trim().to_owned(),
                password,
            }),
            _ => Err(ApiError::field("non_field_errors", REQUIRED)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

impl PasswordChange {
    pub fn from_form(form: &Form) -> Result<Self, ApiError> {
        let mut errors = FieldErrors::new();
        let current_password = form.get_str("current_password", &mut errors);
        let new_password = form.get_str("new_password", &mut errors);
        if let Some(new_password) = &new_password {
            validate_password("new_password", new_password, &mut errors);
        }
        errors.into_result()?;

        match (current_password, new_password) {
            (Some(current_password), Some(new_password)) => Ok(Self {
                current_password,
                new_password,
            }),
            _ => Err(ApiError::field("non_field_errors", REQUIRED)),
        }
    }
}

fn validate_email(email: &str, errors: &mut FieldErrors) {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.contains('@')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };

    if !valid {
        errors.add("email", "Enter a valid email address");
    }
    if email.len() > MAX_EMAIL_LENGTH {
        errors.add(
            "email",
            format!("Ensure this field has no more than {MAX_EMAIL_LENGTH} characters"),
        );
    }
}

fn validate_username(username: &str, errors: &mut FieldErrors) {
    if username.is_empty() {
        errors.add("username", "This field may not be blank");
        return;
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'))
    {
        errors.add(
            "username",
            "Usernames may contain only letters, digits and @/./+/-/_",
        );
    }
    if RESERVED_USERNAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(username))
    {
        errors.add("username", format!("The username \"{username}\" is reserved"));
    }
    if username.chars().count() > MAX_USER_FIELD_LENGTH {
        errors.add(
            "username",
            format!("Ensure this field has no more than {MAX_USER_FIELD_LENGTH} characters"),
        );
    }
}

fn validate_display_name(field: &str, value: &str, errors: &mut FieldErrors) {
    if value.trim().is_empty() {
        errors.add(field, "This field may not be blank");
    } else if value.trim().chars().count() > MAX_USER_FIELD_LENGTH {
        errors.add(
            field,
            format!("Ensure this field has no more than {MAX_USER_FIELD_LENGTH} characters"),
        );
    }
}

fn validate_password(field: &str, password: &str, errors: &mut FieldErrors) {
    if password.is_empty() {
        errors.add(field, "This field may not be blank");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PIXEL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    fn draft(body: Value, policy: ImagePolicy) -> (RecipeDraft, FieldErrors) {
        let form = Form::from_value(body).unwrap();
        let mut errors = FieldErrors::new();
        let draft = RecipeDraft::from_form(&form, policy, &mut errors);
        draft.validate(&ValidationRules::default(), &mut errors);
        (draft, errors)
    }

    fn valid_body() -> Value {
        json!({
            "name": "Borscht",
            "text": "Boil everything",
            "cooking_time": 90,
            "image": PIXEL,
            "tags": [1, 2],
            "ingredients": [{ "id": 3, "amount": 500 }, { "id": 4, "amount": 2 }],
        })
    }

    #[test]
    fn valid_payload_passes() {
        let (draft, errors) = draft(valid_body(), ImagePolicy::Required);
        let payload = draft.into_payload(errors).expect("valid");

        assert_eq!(payload.name, "Borscht");
        assert_eq!(payload.tags, vec![1, 2]);
        assert_eq!(
            payload.ingredients,
            vec![
                IngredientAmount { id: 3, amount: 500 },
                IngredientAmount { id: 4, amount: 2 }
            ]
        );
        assert_eq!(payload.image.map(|image| image.extension), Some("png"));
    }

    #[test]
    fn duplicate_ingredient_ids_fail() {
        let mut body = valid_body();
        body["ingredients"] = json!([{ "id": 3, "amount": 1 }, { "id": 3, "amount": 2 }]);
        let (_, errors) = draft(body, ImagePolicy::Required);

        assert_eq!(
            errors.get("ingredients"),
            Some(&["Ingredients must not repeat".to_owned()][..])
        );
    }

    #[test]
    fn empty_lists_and_duplicate_tags_fail() {
        let mut body = valid_body();
        body["ingredients"] = json!([]);
        body["tags"] = json!([]);
        let (_, errors) = draft(body, ImagePolicy::Required);
        assert!(errors.contains("ingredients"));
        assert!(errors.contains("tags"));

        let mut body = valid_body();
        body["tags"] = json!([1, 1]);
        let (_, errors) = draft(body, ImagePolicy::Required);
        assert_eq!(errors.get("tags"), Some(&["Tags must not repeat".to_owned()][..]));
    }

    #[test]
    fn all_errors_are_reported_together() {
        let body = json!({
            "name": "  ",
            "text": "",
            "cooking_time": 0,
            "tags": [],
            "ingredients": [{ "id": 1, "amount": 0 }],
        });
        let (draft, errors) = draft(body, ImagePolicy::Required);

        for field in ["name", "text", "cooking_time", "tags", "ingredients", "image"] {
            assert!(errors.contains(field), "missing error for {field}");
        }
        assert!(draft.into_payload(errors).is_err());
    }

    #[test]
    fn configured_minimums_apply() {
        let form = Form::from_value(valid_body()).unwrap();
        let mut errors = FieldErrors::new();
        let draft = RecipeDraft::from_form(&form, ImagePolicy::Required, &mut errors);
        let rules = ValidationRules {
            min_cooking_time: 120,
            min_ingredient_amount: 3,
        };
        draft.validate(&rules, &mut errors);

        assert!(errors.contains("cooking_time"));
        assert!(errors.contains("ingredients"));
    }

    #[test]
    fn image_is_optional_on_update() {
        let mut body = valid_body();
        body.as_object_mut().unwrap().remove("image");

        let (_, errors) = draft(body.clone(), ImagePolicy::Optional);
        assert!(errors.is_empty());

        let (_, errors) = draft(body, ImagePolicy::Required);
        assert!(errors.contains("image"));
    }

    #[test]
    fn malformed_ingredient_entries_fail() {
        let mut body = valid_body();
        body["ingredients"] = json!([{ "id": 3 }]);
        let (_, errors) = draft(body, ImagePolicy::Required);
        assert!(errors.contains("ingredients"));
    }

    #[test]
    fn registration_checks_every_field() {
        let form = Form::from_value(json!({
            "email": "not-an-email",
            "username": "me",
            "first_name": "",
            "last_name": "Ivanov",
            "password": "",
        }))
        .unwrap();

        match Registration::from_form(&form) {
            Err(ApiError::Validation(errors)) => {
                for field in ["email", "username", "first_name", "password"] {
                    assert!(errors.contains(field), "missing error for {field}");
                }
                assert!(!errors.contains("last_name"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn registration_accepts_valid_users() {
        let form = Form::from_value(json!({
            "email": "vasya@example.com",
            "username": "vasya.pupkin",
            "first_name": "Vasya",
            "last_name": "Pupkin",
            "password": "Qwerty123",
        }))
        .unwrap();

        let registration = Registration::from_form(&form).expect("valid");
        assert_eq!(registration.username, "vasya.pupkin");
    }

    #[test]
    fn usernames_reject_spaces() {
        let mut errors = FieldErrors::new();
        validate_username("vasya pupkin", &mut errors);
        assert!(errors.contains("username"));
    }
}
