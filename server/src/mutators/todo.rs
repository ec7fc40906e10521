//! Todo-list mutators, the built-in demo application.
//!
//! Todos are stored one per key under [`TODO_PREFIX`].

use serde::{Deserialize, Serialize};

use super::{MutatorError, MutatorFuture, MutatorRegistry, RegistryError};
use crate::transaction::{ScanOptions, WriteTransaction};

pub const TODO_PREFIX: &str = "todo/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub sort: f64,
}

/// A todo as the client creates it; the server picks `sort`.
#[derive(Debug, Deserialize)]
pub struct NewTodo {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct TodoUpdate {
    pub id: String,
    pub text: Option<String>,
    pub completed: Option<bool>,
    pub sort: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct MarkCompleted {
    pub ids: Vec<String>,
    pub completed: bool,
}

/// Registry holding every todo mutator.
pub fn default_registry() -> Result<MutatorRegistry, RegistryError> {
    MutatorRegistry::builder()
        .register("createTodo", create_todo)
        .register("putTodo", put_todo)
        .register("updateTodo", update_todo)
        .register("deleteTodo", delete_todo)
        .register("deleteTodos", delete_todos)
        .register("markTodosCompleted", mark_todos_completed)
        .build()
}

fn todo_key(id: &str) -> String {
    format!("{}{}", TODO_PREFIX, id)
}

async fn load_todo(tx: &mut dyn WriteTransaction, id: &str) -> Result<Option<Todo>, MutatorError> {
    match tx.get(&todo_key(id)).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| MutatorError::Failed(format!("corrupt todo {}: {}", id, e))),
        None => Ok(None),
    }
}

fn store_todo(tx: &mut dyn WriteTransaction, todo: &Todo) -> Result<(), MutatorError> {
    let value = serde_json::to_value(todo).map_err(|e| MutatorError::Failed(e.to_string()))?;
    tx.put(&todo_key(&todo.id), value);
    Ok(())
}

async fn list_todos(tx: &mut dyn WriteTransaction) -> Result<Vec<Todo>, MutatorError> {
    tx.scan(ScanOptions::prefix(TODO_PREFIX))
        .await?
        .into_iter()
        .map(|(key, value)| {
            serde_json::from_value(value)
                .map_err(|e| MutatorError::Failed(format!("corrupt todo at {}: {}", key, e)))
        })
        .collect()
}

/// Insert a todo after every existing one. Concurrent creators get distinct
/// sort values because this runs again on the server.
fn create_todo(tx: &mut dyn WriteTransaction, args: NewTodo) -> MutatorFuture<'_> {
    Box::pin(async move {
        let max_sort = list_todos(tx)
            .await?
            .iter()
            .map(|todo| todo.sort)
            .reduce(f64::max)
            .unwrap_or(0.0);

        store_todo(
            tx,
            &Todo {
                id: args.id,
                text: args.text,
                completed: args.completed,
                sort: max_sort + 1.0,
            },
        )
    })
}

fn put_todo(tx: &mut dyn WriteTransaction, todo: Todo) -> MutatorFuture<'_> {
    Box::pin(async move { store_todo(tx, &todo) })
}

fn update_todo(tx: &mut dyn WriteTransaction, update: TodoUpdate) -> MutatorFuture<'_> {
    Box::pin(async move {
        let mut todo = load_todo(tx, &update.id)
            .await?
            .ok_or_else(|| MutatorError::Failed(format!("todo {} not found", update.id)))?;

        if let Some(text) = update.text {
            todo.text = text;
        }
        if let Some(completed) = update.completed {
            todo.completed = completed;
        }
        if let Some(sort) = update.sort {
            todo.sort = sort;
        }

        store_todo(tx, &todo)
    })
}

fn delete_todo(tx: &mut dyn WriteTransaction, id: String) -> MutatorFuture<'_> {
    Box::pin(async move {
        tx.del(&todo_key(&id)).await?;
        Ok(())
    })
}

fn delete_todos(tx: &mut dyn WriteTransaction, ids: Vec<String>) -> MutatorFuture<'_> {
    Box::pin(async move {
        for id in ids {
            tx.del(&todo_key(&id)).await?;
        }
        Ok(())
    })
}

/// Missing ids are skipped.
fn mark_todos_completed(tx: &mut dyn WriteTransaction, args: MarkCompleted) -> MutatorFuture<'_> {
    Box::pin(async move {
        for id in &args.ids {
            if let Some(mut todo) = load_todo(tx, id).await? {
                todo.completed = args.completed;
                store_todo(tx, &todo)?;
            }
        }
        Ok(())
    })
}
