use axum::{
    extract::{Path, State},
    response::Response,
};
use serde::Serialize;
use std::collections::HashMap;

use crate::db::accounts::CategoryFields;
use crate::db::models::Category;
use crate::error::LedgerError;
use crate::handlers::referenced;
use crate::middleware::auth::AuthUser;
use crate::middleware::extract::Body;
use crate::router::LedgerState;
use crate::types::envelope::{ApiResponse, created};
use crate::types::requests::CategoryRequest;

#[derive(Debug, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// Nest a flat, already ordered list under its parents.
pub fn build_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
    let mut by_parent: HashMap<Option<String>, Vec<Category>> = HashMap::new();
    for category in categories {
        by_parent
            .entry(category.parent_id.clone())
            .or_default()
            .push(category);
    }
    attach(None, &mut by_parent)
}

fn attach(parent: Option<String>, by_parent: &mut HashMap<Option<String>, Vec<Category>>) -> Vec<CategoryNode> {
    let Some(children) = by_parent.remove(&parent) else {
        return Vec::new();
    };
    children
        .into_iter()
        .map(|category| {
            let children = attach(Some(category.id.clone()), by_parent);
            CategoryNode { category, children }
        })
        .collect()
}

/// Whether `ancestor` appears on the parent chain starting at `start`.
fn is_ancestor(categories: &[Category], ancestor: &str, start: &str) -> bool {
    let parents: HashMap<&str, Option<&str>> = categories
        .iter()
        .map(|c| (c.id.as_str(), c.parent_id.as_deref()))
        .collect();
    let mut current = Some(start);
    for _ in 0..=categories.len() {
        match current {
            Some(id) if id == ancestor => return true,
            Some(id) => current = parents.get(id).copied().flatten(),
            None => return false,
        }
    }
    false
}

/// GET /api/categories
pub async fn list_categories(
    State(state): State<LedgerState>,
    auth: AuthUser,
) -> Result<ApiResponse<Vec<CategoryNode>>, LedgerError> {
    let categories = state.storage.list_categories(auth.id()).await?;
    Ok(ApiResponse::ok(build_tree(categories)))
}

async fn resolve_fields(
    state: &LedgerState,
    user_id: &str,
    req: CategoryRequest,
) -> Result<CategoryFields, LedgerError> {
    req.validate()?;
    let category_type = match &req.parent_id {
        Some(parent_id) => {
            let parent = referenced(
                state.storage.get_category(user_id, parent_id).await,
                "parentId",
                "unknown parent category",
            )?;
            if req.category_type.is_some_and(|t| t != parent.category_type) {
                return Err(LedgerError::validation("type", "must match the parent category"));
            }
            parent.category_type
        }
        None => req
            .category_type
            .ok_or_else(|| LedgerError::validation("type", "is required for a top-level category"))?,
    };
    Ok(CategoryFields {
        name: req.name.trim().to_string(),
        parent_id: req.parent_id,
        category_type,
        sort_order: req.sort_order.unwrap_or(0),
    })
}

/// POST /api/categories
pub async fn create_category(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Body(req): Body<CategoryRequest>,
) -> Result<Response, LedgerError> {
    let fields = resolve_fields(&state, auth.id(), req).await?;
    let category = state.storage.insert_category(auth.id(), &fields).await?;
    Ok(created(category))
}

/// PUT /api/categories/{id} -> rename, reorder or re-parent within the same type.
pub async fn update_category(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Body(req): Body<CategoryRequest>,
) -> Result<ApiResponse<Category>, LedgerError> {
    let existing = state.storage.get_category(auth.id(), &id).await?;
    let fields = resolve_fields(&state, auth.id(), req).await?;

    if let Some(parent_id) = &fields.parent_id {
        let all = state.storage.list_categories(auth.id()).await?;
        if is_ancestor(&all, &id, parent_id) {
            return Err(LedgerError::validation(
                "parentId",
                "would make the category its own ancestor",
            ));
        }
    }
    if fields.category_type != existing.category_type {
        return Err(LedgerError::validation("type", "cannot change the category type"));
    }

    let category = state.storage.update_category(auth.id(), &id, &fields).await?;
    // cached reports carry category names, order and grouping
    state.cache.invalidate_user(auth.id());
    Ok(ApiResponse::ok(category))
}

/// DELETE /api/categories/{id}
pub async fn delete_category(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, LedgerError> {
    state.storage.get_category(auth.id(), &id).await?;
    if state.storage.count_child_categories(&id).await? > 0 {
        return Err(LedgerError::Conflict(
            "Category has child categories".to_string(),
        ));
    }
    if state.storage.count_accounts_in_category(&id).await? > 0 {
        return Err(LedgerError::Conflict("Category has accounts".to_string()));
    }
    state.storage.delete_category(auth.id(), &id).await?;
    Ok(ApiResponse::empty())
}
