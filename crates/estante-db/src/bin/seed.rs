//! # Seed Data Generator
//!
//! Populates a database with a demo sebo for development.
//!
//! ## Usage
//! ```bash
//! # Demo sebo with 3 copies per book (default)
//! cargo run -p estante-db --bin seed
//!
//! # More copies per book
//! cargo run -p estante-db --bin seed -- --copies 10
//!
//! # Specify database path
//! cargo run -p estante-db --bin seed -- --db ./data/estante.db
//! ```
//!
//! ## Generated Data
//! - Sebo `demo-sebo` owned by `demo-admin`
//! - One Admin, one Editor, one Reader
//! - A shelf of classics, each with `--copies` copies in rotating condition
//! - Some books registered by ISBN-10, to exercise the 13-digit key rule

use std::env;

use chrono::Utc;
use estante_core::{BookMetadata, ConservationState, Money, Role, Sebo, User};
use estante_db::{Database, DbConfig};

const SEBO_ID: &str = "demo-sebo";

/// (isbn, title, author, category, base price in cents)
const SHELF: &[(&str, &str, &str, &str, i64)] = &[
    ("9780140449136", "Crime and Punishment", "Fyodor Dostoyevsky", "Fiction", 3990),
    ("0140449132", "Crime and Punishment", "Fyodor Dostoyevsky", "Fiction", 3490),
    ("9780141439518", "Pride and Prejudice", "Jane Austen", "Fiction", 2990),
    ("9788535914849", "Dom Casmurro", "Machado de Assis", "Literatura Brasileira", 2490),
    ("9788520923252", "Grande Sertão: Veredas", "João Guimarães Rosa", "Literatura Brasileira", 5990),
    ("080442957X", "A Wrinkle in Time", "Madeleine L'Engle", "Juvenile Fiction", 1990),
    ("9780679783268", "Pride and Prejudice (Modern Library)", "Jane Austen", "Fiction", 3290),
    ("9780062316097", "Sapiens", "Yuval Noah Harari", "History", 4490),
    ("9791034300304", "Les Misérables", "Victor Hugo", "Fiction", 3790),
];

const STATES: &[ConservationState] = &[
    ConservationState::New,
    ConservationState::Good,
    ConservationState::Fair,
    ConservationState::Poor,
];

fn user(id: &str, name: &str, role: Role) -> User {
    User {
        user_id: id.to_string(),
        name: name.to_string(),
        email: format!("{}@estante.dev", id),
        sebo_id: SEBO_ID.to_string(),
        role,
        registered_at: Utc::now(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut copies: usize = 3;
    let mut db_path = String::from("./estante_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--copies" | "-c" => {
                if i + 1 < args.len() {
                    copies = args[i + 1].parse().unwrap_or(3);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Volta Estante Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --copies <N>   Copies per book (default: 3)");
                println!("  -d, --db <PATH>    Database file path (default: ./estante_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("📚 Volta Estante Seed Data Generator");
    println!("====================================");
    println!("Database: {}", db_path);
    println!("Copies per book: {}", copies);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if db.sebos().exists(SEBO_ID).await? {
        println!("⚠ Sebo '{}' already exists", SEBO_ID);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let sebo = Sebo {
        sebo_id: SEBO_ID.to_string(),
        owner_user_id: "demo-admin".to_string(),
        display_name: "Sebo Demonstração".to_string(),
        created_at: Utc::now(),
    };
    db.users()
        .register(&user("demo-admin", "Ana Admin", Role::Admin), Some(&sebo))
        .await?;
    db.users()
        .register(&user("demo-editor", "Eduardo Editor", Role::Editor), None)
        .await?;
    db.users()
        .register(&user("demo-reader", "Rita Reader", Role::Reader), None)
        .await?;
    println!("✓ Created sebo with 3 users");

    let start = std::time::Instant::now();
    let mut added = 0;

    for (book_idx, (isbn, title, author, category, base_cents)) in SHELF.iter().enumerate() {
        let metadata = BookMetadata {
            isbn: isbn.to_string(),
            title: title.to_string(),
            authors: vec![author.to_string()],
            categories: vec![category.to_string()],
            language: Some("pt-BR".to_string()),
            ..Default::default()
        };

        for copy_idx in 0..copies {
            let state = STATES[(book_idx + copy_idx) % STATES.len()];
            let price = Money::from_cents(base_cents - (copy_idx as i64 % 4) * 250);

            match db.books().add_copy(SEBO_ID, &metadata, price, state).await {
                Ok(copy) => {
                    if copy.created_book {
                        println!("  + {} ({})", title, copy.isbn);
                    }
                    added += 1;
                }
                Err(e) => eprintln!("Failed to add copy of {}: {}", isbn, e),
            }
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Added {} copies in {:?}", added, elapsed);

    let books = db.books().list(SEBO_ID).await?;
    println!("✓ {} distinct books on the shelf", books.len());
    for book in &books {
        println!("  {:>3} × {}", book.total_quantity, book.title);
    }

    db.close().await;
    println!();
    println!("🎉 Seed complete!");

    Ok(())
}
