use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::geo::{GeoLocator, UNKNOWN_COUNTRY};
use crate::model::{CommentNode, RequestContext};
use crate::response::ResponseDto;
use crate::service::comment::{add_comment, NewComment};
use crate::service::thread::load_thread;
use crate::service::vote::vote_comment;
use crate::store::Database;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/list").route(web::get().to(list)))
        .service(web::resource("/add").route(web::post().to(add)))
        .service(web::resource("/vote").route(web::post().to(vote)));
}

#[derive(Deserialize)]
struct ListQuery {
    content_type: String,
    content_id: i64,
}

#[derive(Serialize)]
struct ListResponse {
    comments: Vec<CommentNode>,
}

#[derive(Deserialize)]
struct AddCommentRequest {
    content_type: String,
    content_id: i64,
    comment_text: String,
    parent_id: Option<i64>,
}

#[derive(Deserialize)]
struct VoteRequest {
    comment_id: i64,
    vote_type: String,
}

#[derive(Serialize)]
struct VoteResponse {
    upvotes: u32,
    downvotes: u32,
}

async fn list(
    db: web::Data<dyn Database>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let comments = load_thread(db.get_ref(), &query.content_type, query.content_id).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(ListResponse { comments }))))
}

async fn add(
    req: HttpRequest,
    db: web::Data<dyn Database>,
    geo: web::Data<GeoLocator>,
    auth: AuthUser,
    payload: web::Json<AddCommentRequest>,
) -> Result<HttpResponse, AppError> {
    let payload = payload.into_inner();
    let ctx = auth.context(&req, geo.get_ref()).await;
    let input = NewComment {
        content_type: payload.content_type,
        content_id: payload.content_id,
        comment_text: payload.comment_text,
        parent_id: payload.parent_id,
    };
    add_comment(db.get_ref(), &ctx, input).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::<()>::success(None)))
}

async fn vote(
    db: web::Data<dyn Database>,
    auth: AuthUser,
    payload: web::Json<VoteRequest>,
) -> Result<HttpResponse, AppError> {
    // voting does not record a country, skip the lookup
    let ctx = RequestContext {
        user_id: auth.user_id,
        country: UNKNOWN_COUNTRY.to_string(),
    };
    let tally = vote_comment(db.get_ref(), &ctx, payload.comment_id, &payload.vote_type).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(VoteResponse {
        upvotes: tally.upvotes,
        downvotes: tally.downvotes,
    }))))
}
