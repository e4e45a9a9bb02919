use axum::{extract::State, http::StatusCode, Json};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::update::{CallbackQuery, Message, TgUser, Update};
use crate::error::AppError;
use crate::notify::messages::strings;
use crate::notify::{InlineButton, InlineKeyboard, Notifier};
use crate::pipeline::EnrichmentJob;
use crate::posts::repo as posts;
use crate::state::AppState;
use crate::users::repo::{self as users, NewUser, User};

/// Telegram webhook entry point. The Bot API retries deliveries that do not
/// get a 2xx back, so handler failures are logged and swallowed; a bad
/// update must not wedge the webhook queue.
pub async fn webhook(State(state): State<AppState>, Json(update): Json<Update>) -> StatusCode {
    let update_id = update.update_id;
    let result = match (update.message, update.callback_query) {
        (Some(message), _) => handle_message(&state, message).await,
        (None, Some(callback)) => handle_callback(&state, callback).await,
        (None, None) => Ok(()),
    };
    if let Err(err) = result {
        error!(update_id, error = %err, "webhook update failed");
    }
    StatusCode::OK
}

async fn handle_message(state: &AppState, msg: Message) -> Result<(), AppError> {
    let Some(from) = msg.from.clone() else {
        return Ok(());
    };
    if from.is_bot || !msg.chat.is_private() {
        return Ok(());
    }

    let chat_id = msg.chat.id;
    let user = match users::find_by_chat_id(&state.db, chat_id).await? {
        Some(user) => user,
        None => {
            let user = register_user(state, chat_id, &from).await?;
            welcome(state, &user).await;
            return Ok(());
        }
    };
    let locale = user.locale();

    if msg.text.as_deref() == Some("/start") {
        welcome(state, &user).await;
        return Ok(());
    }
    if msg.text.as_deref() == Some("/reset") {
        match users::delete_by_id(&state.db, user.id).await {
            Ok(()) => {
                info!(user_id = user.id, chat_id, "user reset via bot command");
                send(state, chat_id, strings(locale).user_deleted, None).await;
            }
            Err(err) => {
                error!(user_id = user.id, chat_id, error = %err, "user reset failed");
                send(state, chat_id, strings(locale).user_delete_failed, None).await;
            }
        }
        return Ok(());
    }

    if !msg.photo.is_empty() {
        return handle_photo(state, &user, &msg).await;
    }

    if msg.document.is_some() {
        // Compressed photos only; files skip Telegram's recompression and
        // the recognition stage cannot rely on their format.
        send(state, chat_id, strings(locale).photo_add_error, None).await;
        return Ok(());
    }

    let s = strings(locale);
    let markup = InlineKeyboard::single(InlineButton::web_app(
        s.open_app,
        &state.config.telegram.web_app_url,
    ));
    send(state, chat_id, s.open_web_app, Some(markup)).await;
    Ok(())
}

/// Downloads the largest photo variant, re-uploads it to object storage,
/// creates a hidden draft and hands it to the enrichment pipeline. The
/// placeholder message id is recorded so the pipeline can edit it later.
async fn handle_photo(state: &AppState, user: &User, msg: &Message) -> Result<(), AppError> {
    let locale = user.locale();
    let chat_id = msg.chat.id;

    let Some(photo) = msg.photo.iter().max_by_key(|p| p.file_size.unwrap_or(0)) else {
        return Ok(());
    };

    let photo_url = match fetch_and_store(state, user.id, &photo.file_id).await {
        Ok(url) => url,
        Err(err) => {
            warn!(user_id = user.id, error = %err, "photo upload failed");
            send(state, chat_id, strings(locale).upload_error, None).await;
            return Ok(());
        }
    };

    let caption = msg.caption.as_deref().or(msg.text.as_deref());
    let post = posts::create_post(&state.db, user.id, &photo_url, caption, true).await?;

    let message_id = state
        .tg
        .send_message(chat_id, strings(locale).getting_insights, None)
        .await
        .map_err(AppError::Other)?;
    state
        .correlation
        .record_sent_message(chat_id, post.id, message_id)
        .await?;

    state.pipeline.spawn(EnrichmentJob {
        user_id: user.id,
        post_id: post.id,
        chat_id,
        locale,
    });
    Ok(())
}

async fn fetch_and_store(state: &AppState, user_id: i64, file_id: &str) -> anyhow::Result<String> {
    let url = state.tg.file_download_url(file_id).await?;
    let bytes = state.tg.download(&url).await?;
    let key = format!("{user_id}/{}.jpg", Uuid::new_v4());
    state.storage.put_object(&key, bytes, "image/jpeg").await?;
    Ok(state.config.public_url(&key))
}

async fn handle_callback(state: &AppState, cb: CallbackQuery) -> Result<(), AppError> {
    let Some(data) = cb.data.as_deref() else {
        return Ok(());
    };
    let Some(message) = cb.message else {
        return Ok(());
    };

    if let Some(post_id) = data.strip_prefix("share_") {
        let post_id: i64 = post_id
            .parse()
            .map_err(|_| AppError::Validation(format!("bad callback data: {data}")))?;

        let user = users::find_by_chat_id(&state.db, cb.from.id)
            .await?
            .ok_or(AppError::NotFound)?;
        posts::publish_post(&state.db, user.id, post_id).await?;
        info!(user_id = user.id, post_id, "post shared to feed");

        let s = strings(user.locale());
        let url = format!(
            "{}?startapp=p{post_id}",
            state.config.telegram.web_app_url.trim_end_matches('/')
        );
        let markup = InlineKeyboard::single(InlineButton::url(s.open_app, url));
        state
            .tg
            .edit_message(message.chat.id, message.message_id, s.check_in_app, Some(markup))
            .await
            .map_err(AppError::Other)?;
    }
    Ok(())
}

async fn register_user(state: &AppState, chat_id: i64, from: &TgUser) -> Result<User, AppError> {
    let username = if from.username.is_empty() {
        format!("u_{}", from.id)
    } else {
        from.username.clone()
    };
    let new = NewUser {
        chat_id,
        username,
        first_name: non_empty(&from.first_name),
        last_name: non_empty(&from.last_name),
        language_code: from.language_code.clone(),
        notifications_enabled: true,
        avatar_url: Some(crate::auth::handlers::random_avatar_url(&state.config.cdn_url)),
    };
    let user = users::create(&state.db, &new).await?;
    info!(user_id = user.id, chat_id, "user created via bot");
    Ok(user)
}

/// First-contact greeting: welcome text, a web-app button, and the
/// persistent chat menu button pointing at the mini-app.
async fn welcome(state: &AppState, user: &User) {
    let s = strings(user.locale());
    let markup = InlineKeyboard::single(InlineButton::web_app(
        s.open_app,
        &state.config.telegram.web_app_url,
    ));
    send(state, user.chat_id, s.welcome, Some(markup)).await;

    if let Err(err) = state
        .tg
        .set_menu_button(user.chat_id, s.open_app, &state.config.telegram.web_app_url)
        .await
    {
        warn!(chat_id = user.chat_id, error = %err, "failed to set menu button");
    }
}

async fn send(state: &AppState, chat_id: i64, text: &str, markup: Option<InlineKeyboard>) {
    if let Err(err) = state.tg.send_message(chat_id, text, markup).await {
        warn!(chat_id, error = %err, "failed to send bot message");
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
