//! Expense models: categorized property expenses, the category tree,
//! vendors and scanned receipts.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::common::PageParams;

/// Expense lifecycle. Only pending and disputed expenses may change status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "expense_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    Pending,
    Paid,
    Cancelled,
    Disputed,
}

impl ExpenseStatus {
    pub fn can_transition_to(self, next: ExpenseStatus) -> bool {
        use ExpenseStatus::*;
        matches!(
            (self, next),
            (Pending, Paid | Cancelled | Disputed) | (Disputed, Paid | Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExpenseStatus::Pending => "pending",
            ExpenseStatus::Paid => "paid",
            ExpenseStatus::Cancelled => "cancelled",
            ExpenseStatus::Disputed => "disputed",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Expense {
    pub id: Uuid,
    pub property_id: Uuid,
    pub category_id: Uuid,
    pub vendor_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub amount_cents: i64,
    pub tax_amount_cents: Option<i64>,
    pub transaction_date: NaiveDate,
    pub description: Option<String>,
    pub status: ExpenseStatus,
    pub receipt_image_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for recording an expense.
///
/// # JSON Example
///
/// ```json
/// {
///   "property_id": "550e8400-e29b-41d4-a716-446655440000",
///   "category_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
///   "vendor_id": null,
///   "amount_cents": 45000,
///   "transaction_date": "2025-04-12",
///   "description": "Boiler service"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateExpenseRequest {
    pub property_id: Uuid,
    pub category_id: Uuid,
    pub vendor_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub amount_cents: i64,
    pub tax_amount_cents: Option<i64>,
    pub transaction_date: NaiveDate,
    pub description: Option<String>,
    pub receipt_image_id: Option<Uuid>,
}

impl CreateExpenseRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.amount_cents <= 0 {
            return Err(AppError::Validation("Amount must be positive".to_string()));
        }
        if matches!(self.tax_amount_cents, Some(tax) if tax < 0) {
            return Err(AppError::Validation(
                "Tax amount cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateExpenseStatusRequest {
    pub status: ExpenseStatus,
}

/// Filters for `GET /expenses`.
#[derive(Debug, Deserialize)]
pub struct ExpenseQuery {
    pub property_id: Uuid,
    pub category_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub status: Option<ExpenseStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ExpenseQuery {
    pub fn page(&self) -> PageParams {
        PageParams {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ExpenseCategory {
    pub id: Uuid,
    pub name: String,
    pub parent_category_id: Option<Uuid>,
    pub is_tax_deductible: bool,
    pub is_active: bool,
}

/// A category with its subcategories.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: ExpenseCategory,
    pub children: Vec<CategoryNode>,
}

/// Arrange a flat category list into a forest.
///
/// Children are grouped by parent in one pass; categories whose parent is
/// absent from `categories` (for instance an inactive parent that was
/// filtered out) become roots. Siblings keep their input order.
pub fn build_category_tree(categories: Vec<ExpenseCategory>) -> Vec<CategoryNode> {
    let known: std::collections::HashSet<Uuid> = categories.iter().map(|c| c.id).collect();

    let mut children: HashMap<Option<Uuid>, Vec<ExpenseCategory>> = HashMap::new();
    for category in categories {
        let parent = category
            .parent_category_id
            .filter(|parent| known.contains(parent));
        children.entry(parent).or_default().push(category);
    }

    attach_children(None, &mut children)
}

fn attach_children(
    parent: Option<Uuid>,
    children: &mut HashMap<Option<Uuid>, Vec<ExpenseCategory>>,
) -> Vec<CategoryNode> {
    let Some(level) = children.remove(&parent) else {
        return Vec::new();
    };

    level
        .into_iter()
        .map(|category| {
            let nested = attach_children(Some(category.id), children);
            CategoryNode {
                category,
                children: nested,
            }
        })
        .collect()
}

/// Query for `GET /expense-categories`.
#[derive(Debug, Default, Deserialize)]
pub struct CategoryQuery {
    #[serde(default)]
    pub include_inactive: bool,
    #[serde(default)]
    pub include_hierarchy: bool,
}

/// Either shape returned by the category listing.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CategoryListing {
    Flat(Vec<ExpenseCategory>),
    Tree(Vec<CategoryNode>),
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub parent_category_id: Option<Uuid>,
    #[serde(default)]
    pub is_tax_deductible: bool,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Vendor {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateVendorRequest {
    pub name: String,
}

/// First active vendor whose name contains, or is contained in, the scanned
/// vendor name, ignoring case.
pub fn match_vendor<'a>(scanned_name: &str, vendors: &'a [Vendor]) -> Option<&'a Vendor> {
    let scanned = scanned_name.trim().to_lowercase();
    if scanned.is_empty() {
        return None;
    }

    vendors.iter().filter(|v| v.is_active).find(|vendor| {
        let name = vendor.name.trim().to_lowercase();
        !name.is_empty() && (scanned.contains(&name) || name.contains(&scanned))
    })
}

/// Stored receipt upload. The bytes themselves are not loaded.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ReceiptImage {
    pub id: Uuid,

    /// Hex SHA-256 of the uploaded bytes; identical uploads share a row.
    pub content_hash: String,

    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub scanned_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Fields extracted from a receipt by the OCR service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannedReceipt {
    pub vendor: Option<String>,

    /// Receipt total in dollars.
    pub total_amount: Option<Decimal>,

    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub amount: Option<Decimal>,
}

/// Pre-filled expense built from a scanned receipt, for the client to
/// review and submit.
#[derive(Debug, Serialize)]
pub struct ExpenseDraft {
    pub receipt_image_id: Uuid,
    pub vendor_id: Option<Uuid>,
    pub vendor_name: Option<String>,
    pub amount_cents: Option<i64>,
    pub transaction_date: Option<NaiveDate>,
    pub line_items: Vec<LineItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str, parent: Option<Uuid>) -> ExpenseCategory {
        ExpenseCategory {
            id: Uuid::new_v4(),
            name: name.to_string(),
            parent_category_id: parent,
            is_tax_deductible: false,
            is_active: true,
        }
    }

    fn vendor(name: &str, is_active: bool) -> Vendor {
        Vendor {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_active,
        }
    }

    #[test]
    fn expense_status_transitions() {
        use ExpenseStatus::*;

        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Disputed));
        assert!(Disputed.can_transition_to(Cancelled));
        assert!(!Paid.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Paid));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn builds_nested_category_tree() {
        let maintenance = category("Maintenance", None);
        let plumbing = category("Plumbing", Some(maintenance.id));
        let leaks = category("Leaks", Some(plumbing.id));
        let utilities = category("Utilities", None);

        let tree = build_category_tree(vec![
            leaks.clone(),
            utilities.clone(),
            plumbing.clone(),
            maintenance.clone(),
        ]);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].category.name, "Utilities");
        assert_eq!(tree[1].category.name, "Maintenance");
        assert_eq!(tree[1].children[0].category.id, plumbing.id);
        assert_eq!(tree[1].children[0].children[0].category.id, leaks.id);
    }

    #[test]
    fn orphaned_categories_become_roots() {
        let orphan = category("Landscaping", Some(Uuid::new_v4()));

        let tree = build_category_tree(vec![orphan.clone()]);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].category.id, orphan.id);
    }

    #[test]
    fn vendor_matching_is_case_insensitive_both_ways() {
        let vendors = vec![
            vendor("Ace Plumbing", false),
            vendor("ACE PLUMBING SUPPLY", true),
            vendor("Home Depot", true),
        ];

        assert_eq!(
            match_vendor("ace plumbing", &vendors).map(|v| v.name.as_str()),
            Some("ACE PLUMBING SUPPLY")
        );
        assert_eq!(
            match_vendor("THE HOME DEPOT #4411", &vendors).map(|v| v.name.as_str()),
            Some("Home Depot")
        );
        assert!(match_vendor("Lowe's", &vendors).is_none());
        assert!(match_vendor("  ", &vendors).is_none());
    }

    #[test]
    fn scanned_receipt_tolerates_missing_fields() {
        let scanned: ScannedReceipt =
            serde_json::from_str(r#"{"vendor": "Home Depot", "total_amount": "12.50"}"#).unwrap();

        assert_eq!(scanned.vendor.as_deref(), Some("Home Depot"));
        assert!(scanned.line_items.is_empty());
        assert!(scanned.date.is_none());
    }
}
