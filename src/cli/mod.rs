pub mod commands;

use crate::cli::commands::{Commands, SessionAction};
use crate::config::AppConfig;
use crate::db::{get_connection, service::DbService};

pub fn run_cli(command: Commands, config_path: String) {
    let config = AppConfig::load(&config_path).expect("Failed to load config");

    match command {
        Commands::Serve => {
            panic!("Serve command should be intercepted by main.rs to boot actix-web");
        }
        Commands::Session { action } => {
            let pool = get_connection(&config.database).expect("DB error");
            let conn = pool.lock().unwrap();

            match action {
                SessionAction::Create { user, name } => {
                    match DbService::insert_session(&conn, &user, &name) {
                        Ok(session) => {
                            println!("Created Session: {} ({})", session.name, session.id)
                        }
                        Err(e) => eprintln!("Error: {}", e),
                    }
                }
                SessionAction::List { user, page, size } => {
                    match DbService::find_sessions_by_user(&conn, &user, page, size) {
                        Ok((sessions, total)) => {
                            if sessions.is_empty() {
                                println!("No sessions found for user {}.", user);
                            } else {
                                println!(
                                    "{:<38} | {:<20} | {:<4} | {}",
                                    "ID", "Created At", "Fav", "Name"
                                );
                                println!("{:-<38}-+-{:-<20}-+-{:-<4}-+-{:-<20}", "", "", "", "");
                                for s in sessions {
                                    println!(
                                        "{:<38} | {:<20} | {:<4} | {}",
                                        s.id.to_string(),
                                        s.created_at,
                                        if s.favorite { "*" } else { "" },
                                        s.name
                                    );
                                }
                                println!("({} total)", total);
                            }
                        }
                        Err(e) => eprintln!("Error: {}", e),
                    }
                }
                SessionAction::Rename { id, name } => {
                    match DbService::rename_session(&conn, id, &name) {
                        Ok(Some(session)) => println!("Renamed session {} to '{}'", id, session.name),
                        Ok(None) => eprintln!("Session {} not found.", id),
                        Err(e) => eprintln!("Error: {}", e),
                    }
                }
                SessionAction::Favorite { id, value } => {
                    match DbService::set_favorite(&conn, id, value) {
                        Ok(Some(session)) => {
                            println!("Session {} favorite={}", id, session.favorite)
                        }
                        Ok(None) => eprintln!("Session {} not found.", id),
                        Err(e) => eprintln!("Error: {}", e),
                    }
                }
                SessionAction::Delete { id } => match DbService::delete_session(&conn, id) {
                    Ok(_) => println!("Deleted session {}", id),
                    Err(e) => eprintln!("Error: {}", e),
                },
            }
        }
    }
}
