// src/db.rs - Database migrations and setup

use sqlx::SqlitePool;
use anyhow::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys and WAL mode
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;

    // Create users table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            email TEXT NOT NULL UNIQUE CHECK(length(email) >= 5 AND length(email) <= 255),
            role TEXT NOT NULL DEFAULT 'student' CHECK(
                role IN ('admin', 'faculty', 'student', 'lab_technician')
            ),
            department TEXT CHECK(department IS NULL OR length(department) <= 255),
            student_id TEXT CHECK(student_id IS NULL OR length(student_id) <= 50),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Create labs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS labs (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE CHECK(length(name) > 0 AND length(name) <= 255),
            location TEXT CHECK(location IS NULL OR length(location) <= 255),
            department TEXT CHECK(department IS NULL OR length(department) <= 255),
            capacity INTEGER CHECK(capacity IS NULL OR (capacity >= 1 AND capacity <= 1000)),
            status TEXT NOT NULL DEFAULT 'active' CHECK(
                status IN ('active', 'inactive', 'closed')
            ),
            description TEXT CHECK(description IS NULL OR length(description) <= 1000),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Create equipment table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS equipment (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            model TEXT CHECK(model IS NULL OR length(model) <= 255),
            category TEXT NOT NULL CHECK(length(category) > 0 AND length(category) <= 100),
            status TEXT NOT NULL DEFAULT 'available' CHECK(
                status IN ('available', 'in_use', 'maintenance', 'broken', 'retired')
            ),
            lab_id TEXT,
            serial_number TEXT CHECK(serial_number IS NULL OR length(serial_number) <= 100),
            description TEXT CHECK(description IS NULL OR length(description) <= 1000),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (lab_id) REFERENCES labs (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Create bookings table
    // equipment_id and lab_id are both optional: a booking can reserve a piece
    // of equipment, a whole lab, or (legacy rows) neither.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bookings (
            id TEXT PRIMARY KEY,
            equipment_id TEXT,
            lab_id TEXT,
            user_id TEXT NOT NULL,
            start_time DATETIME NOT NULL,
            end_time DATETIME NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK(
                status IN ('pending', 'confirmed', 'completed', 'cancelled')
            ),
            purpose TEXT CHECK(purpose IS NULL OR length(purpose) <= 500),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (equipment_id) REFERENCES equipment (id) ON DELETE SET NULL,
            FOREIGN KEY (lab_id) REFERENCES labs (id) ON DELETE SET NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Create maintenance_records table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS maintenance_records (
            id TEXT PRIMARY KEY,
            equipment_id TEXT,
            maintenance_type TEXT NOT NULL CHECK(
                maintenance_type IN ('preventive', 'corrective', 'calibration', 'inspection', 'other')
            ),
            scheduled_date DATETIME NOT NULL,
            completed_date DATETIME,
            status TEXT NOT NULL DEFAULT 'scheduled' CHECK(
                status IN ('scheduled', 'in_progress', 'completed', 'cancelled')
            ),
            technician_id TEXT,
            equipment_name TEXT CHECK(equipment_name IS NULL OR length(equipment_name) <= 255),
            technician_name TEXT CHECK(technician_name IS NULL OR length(technician_name) <= 255),
            estimated_cost REAL NOT NULL DEFAULT 0 CHECK(estimated_cost >= 0),
            actual_cost REAL CHECK(actual_cost IS NULL OR actual_cost >= 0),
            duration_minutes REAL NOT NULL DEFAULT 0 CHECK(duration_minutes >= 0),
            priority TEXT NOT NULL DEFAULT 'medium' CHECK(
                priority IN ('low', 'medium', 'high', 'critical')
            ),
            description TEXT CHECK(description IS NULL OR length(description) <= 1000),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (equipment_id) REFERENCES equipment (id) ON DELETE SET NULL,
            FOREIGN KEY (technician_id) REFERENCES users (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    // ==================== CREATE INDEXES ====================

    // Equipment indexes
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_equipment_status ON equipment(status)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_equipment_category ON equipment(category)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_equipment_lab_id ON equipment(lab_id)")
        .execute(pool).await;

    // Booking indexes - reports filter on start_time + status constantly
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_start_time ON bookings(start_time)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_status ON bookings(status)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_equipment_id ON bookings(equipment_id)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_user_id ON bookings(user_id)")
        .execute(pool).await;

    // Maintenance indexes
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_maintenance_scheduled_date ON maintenance_records(scheduled_date)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_maintenance_status ON maintenance_records(status)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_maintenance_equipment_id ON maintenance_records(equipment_id)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_maintenance_type ON maintenance_records(maintenance_type)")
        .execute(pool).await;

    // Other indexes
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_role ON users(role)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_labs_status ON labs(status)")
        .execute(pool).await;

    // Run migrations for existing tables
    migrate_existing_tables(pool).await?;

    Ok(())
}

// ==================== MIGRATION FOR EXISTING DATABASES ====================

pub async fn migrate_existing_tables(pool: &SqlitePool) -> Result<()> {
    // Add new columns to existing tables if they don't exist
    let migration_queries = [
        // ==================== EQUIPMENT ====================
        "ALTER TABLE equipment ADD COLUMN model TEXT CHECK(model IS NULL OR length(model) <= 255)",
        "ALTER TABLE equipment ADD COLUMN serial_number TEXT CHECK(serial_number IS NULL OR length(serial_number) <= 100)",

        // ==================== BOOKINGS ====================
        "ALTER TABLE bookings ADD COLUMN purpose TEXT CHECK(purpose IS NULL OR length(purpose) <= 500)",

        // ==================== MAINTENANCE ====================
        "ALTER TABLE maintenance_records ADD COLUMN equipment_name TEXT CHECK(equipment_name IS NULL OR length(equipment_name) <= 255)",
        "ALTER TABLE maintenance_records ADD COLUMN technician_name TEXT CHECK(technician_name IS NULL OR length(technician_name) <= 255)",
        "ALTER TABLE maintenance_records ADD COLUMN duration_minutes REAL NOT NULL DEFAULT 0 CHECK(duration_minutes >= 0)",
        "ALTER TABLE maintenance_records ADD COLUMN priority TEXT NOT NULL DEFAULT 'medium' CHECK(priority IN ('low', 'medium', 'high', 'critical'))",

        // ==================== USERS ====================
        "ALTER TABLE users ADD COLUMN department TEXT CHECK(department IS NULL OR length(department) <= 255)",
        "ALTER TABLE users ADD COLUMN student_id TEXT CHECK(student_id IS NULL OR length(student_id) <= 50)",
    ];

    for query in migration_queries.iter() {
        // Ignore errors for existing columns
        let _ = sqlx::query(query).execute(pool).await;
    }

    Ok(())
}

// ==================== DATABASE RESET (DEVELOPMENT ONLY) ====================

pub async fn reset_database(pool: &SqlitePool) -> Result<()> {
    log::warn!("Resetting database - all data will be lost!");

    let drop_queries = [
        "DROP TABLE IF EXISTS maintenance_records",
        "DROP TABLE IF EXISTS bookings",
        "DROP TABLE IF EXISTS equipment",
        "DROP TABLE IF EXISTS labs",
        "DROP TABLE IF EXISTS users",
    ];

    for query in drop_queries.iter() {
        let _ = sqlx::query(query).execute(pool).await;
    }

    // Recreate tables
    run_migrations(pool).await?;

    Ok(())
}

// ==================== UTILITY FUNCTIONS ====================

/// Check if a column exists in a table
#[allow(dead_code)]
pub async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let query = format!("SELECT COUNT(*) as count FROM pragma_table_info('{}') WHERE name = ?", table);
    let result: (i32,) = sqlx::query_as(&query)
        .bind(column)
        .fetch_one(pool)
        .await?;
    Ok(result.0 > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        SqlitePool::connect("sqlite::memory:").await.expect("in-memory pool")
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.expect("first run");
        run_migrations(&pool).await.expect("second run");
    }

    #[tokio::test]
    async fn test_schema_columns() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        assert!(column_exists(&pool, "bookings", "equipment_id").await.unwrap());
        assert!(column_exists(&pool, "bookings", "purpose").await.unwrap());
        assert!(column_exists(&pool, "maintenance_records", "duration_minutes").await.unwrap());
        assert!(column_exists(&pool, "maintenance_records", "technician_name").await.unwrap());
        assert!(column_exists(&pool, "users", "student_id").await.unwrap());
        assert!(!column_exists(&pool, "equipment", "no_such_column").await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_database_recreates_schema() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO labs (id, name, status, created_at, updated_at)
             VALUES ('l1', 'Chem Lab', 'active', datetime('now'), datetime('now'))",
        )
        .execute(&pool)
        .await
        .unwrap();

        reset_database(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM labs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_status_check_constraint() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO equipment (id, name, category, status, created_at, updated_at)
             VALUES ('e1', 'Scope', 'microscope', 'bogus_status', datetime('now'), datetime('now'))",
        )
        .execute(&pool)
        .await;

        assert!(result.is_err());
    }
}
