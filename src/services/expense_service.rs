//! Expense management: recording and listing expenses, the status state
//! machine, categories, vendors, receipt scanning and expense reports.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::common::PageMeta;
use crate::models::expense::{
    CategoryListing, CategoryQuery, CreateCategoryRequest, CreateExpenseRequest,
    CreateVendorRequest, Expense, ExpenseCategory, ExpenseDraft, ExpenseQuery, ExpenseStatus,
    ReceiptImage, ScannedReceipt, Vendor, build_category_tree, match_vendor,
};
use crate::models::late_fee::dollars_to_cents;
use crate::models::report::{ExpenseReport, ExpenseReportQuery, ExpenseReportRow, ReportType};
use crate::services::property_service;
use crate::services::receipt_scanner::ReceiptScanner;

/// Largest receipt upload accepted, in bytes.
pub const MAX_RECEIPT_BYTES: usize = 10 * 1024 * 1024;

const RECEIPT_COLUMNS: &str =
    "id, content_hash, file_name, content_type, size_bytes, scanned_data, created_at";

/// Record a new expense in `pending` status.
pub async fn record_expense(
    pool: &DbPool,
    user_id: Uuid,
    request: CreateExpenseRequest,
) -> Result<Expense, AppError> {
    request.validate()?;
    property_service::require_property(pool, user_id, request.property_id).await?;

    let category_active: Option<bool> =
        sqlx::query_scalar("SELECT is_active FROM expense_categories WHERE id = $1")
            .bind(request.category_id)
            .fetch_optional(pool)
            .await?;
    match category_active {
        None => return Err(AppError::NotFound("Expense category")),
        Some(false) => {
            return Err(AppError::BusinessRule(
                "Expense category is inactive".to_string(),
            ));
        }
        Some(true) => {}
    }

    if let Some(vendor_id) = request.vendor_id {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM vendors WHERE id = $1")
            .bind(vendor_id)
            .fetch_optional(pool)
            .await?
            .ok_or(AppError::NotFound("Vendor"))?;
    }

    if let Some(unit_id) = request.unit_id {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM units WHERE id = $1 AND property_id = $2")
            .bind(unit_id)
            .bind(request.property_id)
            .fetch_optional(pool)
            .await?
            .ok_or(AppError::NotFound("Unit"))?;
    }

    let expense = sqlx::query_as::<_, Expense>(
        r#"
        INSERT INTO expenses (
            property_id,
            category_id,
            vendor_id,
            unit_id,
            amount_cents,
            tax_amount_cents,
            transaction_date,
            description,
            receipt_image_id,
            created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(request.property_id)
    .bind(request.category_id)
    .bind(request.vendor_id)
    .bind(request.unit_id)
    .bind(request.amount_cents)
    .bind(request.tax_amount_cents)
    .bind(request.transaction_date)
    .bind(&request.description)
    .bind(request.receipt_image_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    tracing::info!(expense_id = %expense.id, property_id = %expense.property_id, amount_cents = expense.amount_cents, "Expense recorded");

    Ok(expense)
}

pub async fn list_expenses(
    pool: &DbPool,
    user_id: Uuid,
    query: &ExpenseQuery,
) -> Result<(Vec<Expense>, PageMeta), AppError> {
    property_service::require_property(pool, user_id, query.property_id).await?;

    let page = query.page();
    let filter = r#"
        property_id = $1
        AND ($2::uuid IS NULL OR category_id = $2)
        AND ($3::uuid IS NULL OR vendor_id = $3)
        AND ($4::expense_status IS NULL OR status = $4)
        AND ($5::date IS NULL OR transaction_date >= $5)
        AND ($6::date IS NULL OR transaction_date <= $6)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM expenses WHERE {filter}"))
        .bind(query.property_id)
        .bind(query.category_id)
        .bind(query.vendor_id)
        .bind(query.status)
        .bind(query.start_date)
        .bind(query.end_date)
        .fetch_one(pool)
        .await?;

    let expenses = sqlx::query_as::<_, Expense>(&format!(
        "SELECT * FROM expenses WHERE {filter} \
         ORDER BY transaction_date DESC, created_at DESC LIMIT $7 OFFSET $8"
    ))
    .bind(query.property_id)
    .bind(query.category_id)
    .bind(query.vendor_id)
    .bind(query.status)
    .bind(query.start_date)
    .bind(query.end_date)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok((expenses, page.meta(total)))
}

/// Move an expense along its lifecycle.
///
/// # Errors
///
/// - `NotFound`: unknown expense or another manager's expense
/// - `BusinessRule`: the transition is not allowed (e.g. paid → pending)
pub async fn update_expense_status(
    pool: &DbPool,
    user_id: Uuid,
    expense_id: Uuid,
    status: ExpenseStatus,
) -> Result<Expense, AppError> {
    let mut tx = pool.begin().await?;

    let current: ExpenseStatus = sqlx::query_scalar(
        r#"
        SELECT e.status
        FROM expenses e
        JOIN properties pr ON pr.id = e.property_id
        WHERE e.id = $1 AND pr.owner_id = $2
        FOR UPDATE OF e
        "#,
    )
    .bind(expense_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Expense"))?;

    if !current.can_transition_to(status) {
        return Err(AppError::BusinessRule(format!(
            "Cannot change expense from {} to {}",
            current.as_str(),
            status.as_str()
        )));
    }

    let expense = sqlx::query_as::<_, Expense>(
        "UPDATE expenses SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(status)
    .bind(expense_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(expense_id = %expense_id, from = current.as_str(), to = status.as_str(), "Expense status changed");

    Ok(expense)
}

/// Categories as a flat list or as a tree.
pub async fn get_expense_categories(
    pool: &DbPool,
    query: &CategoryQuery,
) -> Result<CategoryListing, AppError> {
    let categories = sqlx::query_as::<_, ExpenseCategory>(
        "SELECT * FROM expense_categories WHERE $1 OR is_active ORDER BY name",
    )
    .bind(query.include_inactive)
    .fetch_all(pool)
    .await?;

    Ok(if query.include_hierarchy {
        CategoryListing::Tree(build_category_tree(categories))
    } else {
        CategoryListing::Flat(categories)
    })
}

pub async fn create_expense_category(
    pool: &DbPool,
    request: CreateCategoryRequest,
) -> Result<ExpenseCategory, AppError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Category name is required".to_string()));
    }

    if let Some(parent_id) = request.parent_category_id {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM expense_categories WHERE id = $1")
            .bind(parent_id)
            .fetch_optional(pool)
            .await?
            .ok_or(AppError::NotFound("Parent category"))?;
    }

    let category = sqlx::query_as::<_, ExpenseCategory>(
        r#"
        INSERT INTO expense_categories (name, parent_category_id, is_tax_deductible)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(request.parent_category_id)
    .bind(request.is_tax_deductible)
    .fetch_one(pool)
    .await?;

    Ok(category)
}

pub async fn list_vendors(pool: &DbPool) -> Result<Vec<Vendor>, AppError> {
    Ok(
        sqlx::query_as::<_, Vendor>("SELECT * FROM vendors WHERE is_active ORDER BY name")
            .fetch_all(pool)
            .await?,
    )
}

pub async fn create_vendor(pool: &DbPool, request: CreateVendorRequest) -> Result<Vendor, AppError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Vendor name is required".to_string()));
    }

    Ok(
        sqlx::query_as::<_, Vendor>("INSERT INTO vendors (name) VALUES ($1) RETURNING *")
            .bind(name)
            .fetch_one(pool)
            .await?,
    )
}

/// Hex SHA-256 of receipt bytes.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn validate_receipt(content_type: &str, content: &[u8]) -> Result<(), AppError> {
    if content.is_empty() {
        return Err(AppError::Validation("Receipt file is empty".to_string()));
    }
    if content.len() > MAX_RECEIPT_BYTES {
        return Err(AppError::Validation(format!(
            "Receipt exceeds {} MB",
            MAX_RECEIPT_BYTES / (1024 * 1024)
        )));
    }
    if !(content_type.starts_with("image/") || content_type == "application/pdf") {
        return Err(AppError::Validation(
            "Receipt must be an image or a PDF".to_string(),
        ));
    }
    Ok(())
}

/// Store receipt bytes, reusing the existing row for identical content.
pub async fn store_receipt(
    pool: &DbPool,
    file_name: &str,
    content_type: &str,
    content: &[u8],
) -> Result<ReceiptImage, AppError> {
    validate_receipt(content_type, content)?;

    let hash = content_hash(content);
    let size_bytes = i64::try_from(content.len())
        .map_err(|_| AppError::Validation("Receipt is too large".to_string()))?;

    let receipt = sqlx::query_as::<_, ReceiptImage>(&format!(
        r#"
        INSERT INTO receipt_images (content_hash, file_name, content_type, size_bytes, content)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (content_hash) DO UPDATE SET content_hash = EXCLUDED.content_hash
        RETURNING {RECEIPT_COLUMNS}
        "#
    ))
    .bind(&hash)
    .bind(file_name)
    .bind(content_type)
    .bind(size_bytes)
    .bind(content)
    .fetch_one(pool)
    .await?;

    Ok(receipt)
}

/// Turn extracted receipt fields into an expense draft.
pub fn draft_from_scan(
    receipt_image_id: Uuid,
    scanned: ScannedReceipt,
    vendors: &[Vendor],
) -> ExpenseDraft {
    let vendor = scanned
        .vendor
        .as_deref()
        .and_then(|name| match_vendor(name, vendors));

    ExpenseDraft {
        receipt_image_id,
        vendor_id: vendor.map(|v| v.id),
        vendor_name: vendor.map(|v| v.name.clone()).or(scanned.vendor),
        amount_cents: scanned.total_amount.and_then(dollars_to_cents),
        transaction_date: scanned.date,
        line_items: scanned.line_items,
    }
}

/// Store a receipt, scan it and return a pre-filled expense.
///
/// Scan results are cached on the receipt row, so uploading the same file
/// again does not call the OCR service a second time.
pub async fn scan_receipt<S: ReceiptScanner>(
    pool: &DbPool,
    scanner: &S,
    file_name: &str,
    content_type: &str,
    content: &[u8],
) -> Result<ExpenseDraft, AppError> {
    let receipt = store_receipt(pool, file_name, content_type, content).await?;

    let cached = receipt
        .scanned_data
        .clone()
        .and_then(|data| serde_json::from_value::<ScannedReceipt>(data).ok());

    let scanned = match cached {
        Some(scanned) => scanned,
        None => {
            let scanned = scanner.scan(content, content_type).await?;
            let data = serde_json::to_value(&scanned)
                .map_err(|e| AppError::Upstream(format!("Unusable OCR result: {e}")))?;
            sqlx::query("UPDATE receipt_images SET scanned_data = $1 WHERE id = $2")
                .bind(data)
                .bind(receipt.id)
                .execute(pool)
                .await?;
            scanned
        }
    };

    let vendors = list_vendors(pool).await?;
    let draft = draft_from_scan(receipt.id, scanned, &vendors);

    tracing::info!(
        receipt_image_id = %receipt.id,
        vendor_matched = draft.vendor_id.is_some(),
        "Receipt scanned"
    );

    Ok(draft)
}

/// Aggregate a property's expenses over a date range.
///
/// Cancelled expenses are excluded. Detailed reports add every expense
/// that went into the groups.
pub async fn generate_expense_report(
    pool: &DbPool,
    user_id: Uuid,
    query: &ExpenseReportQuery,
) -> Result<ExpenseReport, AppError> {
    if query.end_date < query.start_date {
        return Err(AppError::Validation(
            "end_date must not precede start_date".to_string(),
        ));
    }
    property_service::require_property(pool, user_id, query.property_id).await?;

    let (key, label) = query.group_by.key_and_label();
    let sql = format!(
        r#"
        SELECT
            {key} AS group_key,
            {label} AS group_label,
            COUNT(*) AS expense_count,
            COALESCE(SUM(e.amount_cents), 0)::BIGINT AS total_cents,
            COALESCE(SUM(e.tax_amount_cents), 0)::BIGINT AS tax_cents
        FROM expenses e
        JOIN expense_categories c ON c.id = e.category_id
        LEFT JOIN vendors v ON v.id = e.vendor_id
        LEFT JOIN units u ON u.id = e.unit_id
        WHERE e.property_id = $1
          AND e.transaction_date BETWEEN $2 AND $3
          AND e.status <> 'cancelled'
        GROUP BY 1, 2
        ORDER BY 2
        "#
    );

    let groups = sqlx::query_as::<_, ExpenseReportRow>(&sql)
        .bind(query.property_id)
        .bind(query.start_date)
        .bind(query.end_date)
        .fetch_all(pool)
        .await?;

    let line_items = match query.report_type {
        ReportType::Summary => None,
        ReportType::Detailed => Some(
            sqlx::query_as::<_, Expense>(
                r#"
                SELECT *
                FROM expenses
                WHERE property_id = $1
                  AND transaction_date BETWEEN $2 AND $3
                  AND status <> 'cancelled'
                ORDER BY transaction_date, created_at
                "#,
            )
            .bind(query.property_id)
            .bind(query.start_date)
            .bind(query.end_date)
            .fetch_all(pool)
            .await?,
        ),
    };

    Ok(ExpenseReport {
        property_id: query.property_id,
        start_date: query.start_date,
        end_date: query.end_date,
        total_cents: groups.iter().map(|g| g.total_cents).sum(),
        groups,
        line_items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct FixedScanner(ScannedReceipt);

    impl ReceiptScanner for FixedScanner {
        async fn scan(&self, _: &[u8], _: &str) -> Result<ScannedReceipt, AppError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn identical_content_hashes_identically() {
        assert_eq!(content_hash(b"receipt"), content_hash(b"receipt"));
        assert_ne!(content_hash(b"receipt"), content_hash(b"receipt2"));
        assert_eq!(content_hash(b"").len(), 64);
    }

    #[test]
    fn receipt_validation() {
        assert!(validate_receipt("image/jpeg", b"x").is_ok());
        assert!(validate_receipt("application/pdf", b"x").is_ok());
        assert!(validate_receipt("text/plain", b"x").is_err());
        assert!(validate_receipt("image/png", b"").is_err());
    }

    #[tokio::test]
    async fn draft_uses_matched_vendor_and_total() {
        let scanner = FixedScanner(ScannedReceipt {
            vendor: Some("HOME DEPOT #4411".to_string()),
            total_amount: Some(dec!(123.455)),
            date: chrono::NaiveDate::from_ymd_opt(2025, 4, 12),
            line_items: vec![],
        });
        let vendors = vec![Vendor {
            id: Uuid::new_v4(),
            name: "Home Depot".to_string(),
            is_active: true,
        }];

        let scanned = scanner.scan(b"bytes", "image/png").await.unwrap();
        let draft = draft_from_scan(Uuid::new_v4(), scanned, &vendors);

        assert_eq!(draft.vendor_id, Some(vendors[0].id));
        assert_eq!(draft.vendor_name.as_deref(), Some("Home Depot"));
        assert_eq!(draft.amount_cents, Some(12_346));
    }

    #[test]
    fn unmatched_vendor_keeps_scanned_name() {
        let draft = draft_from_scan(
            Uuid::new_v4(),
            ScannedReceipt {
                vendor: Some("Corner Hardware".to_string()),
                ..Default::default()
            },
            &[],
        );

        assert!(draft.vendor_id.is_none());
        assert_eq!(draft.vendor_name.as_deref(), Some("Corner Hardware"));
        assert!(draft.amount_cents.is_none());
    }

    #[test]
    fn absurd_scanned_total_leaves_amount_empty() {
        let draft = draft_from_scan(
            Uuid::new_v4(),
            ScannedReceipt {
                total_amount: Some(rust_decimal::Decimal::MAX),
                ..Default::default()
            },
            &[],
        );

        assert!(draft.amount_cents.is_none());
    }
}
