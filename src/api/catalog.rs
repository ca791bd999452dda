//! Author, category and publisher endpoints
//!
//! The three areas expose the same handlers, generated per area.

macro_rules! catalog_endpoints {
    (
        $module:ident,
        service: $service:ident,
        entity: $entity:ident,
        create: $create:ident,
        update: $update:ident,
        link: $link:ident,
        tag: $tag:tt,
        collection: $collection:tt,
        item: $item:tt,
        book_links: $book_links:tt,
        book_link: $book_link:tt,
        link_item: $link_item:tt $(,)?
    ) => {
        pub mod $module {
            use axum::{
                extract::{Path, Query, State},
                http::StatusCode,
                Json,
            };
            use uuid::Uuid;

            #[allow(unused_imports)]
            use crate::models::{author::*, category::*, publisher::*};
            use crate::{api::AuthenticatedUser, error::AppResult, models::ListQuery, repository::Page, AppState};

            #[utoipa::path(
                get,
                path = $collection,
                tag = $tag,
                security(("bearer_auth" = [])),
                params(ListQuery),
                responses(
                    (status = 200, description = "Page of entries"),
                    (status = 403, description = "Missing read capability")
                )
            )]
            pub async fn list(
                State(state): State<AppState>,
                AuthenticatedUser(caller): AuthenticatedUser,
                Query(query): Query<ListQuery>,
            ) -> AppResult<Json<Page<$entity>>> {
                Ok(Json(state.services.$service.list(&caller, query).await?))
            }

            #[utoipa::path(
                get,
                path = $item,
                tag = $tag,
                security(("bearer_auth" = [])),
                params(("id" = Uuid, Path, description = "Entry ID")),
                responses(
                    (status = 200, description = "Entry", body = $entity),
                    (status = 404, description = "Not found")
                )
            )]
            pub async fn get(
                State(state): State<AppState>,
                AuthenticatedUser(caller): AuthenticatedUser,
                Path(id): Path<Uuid>,
            ) -> AppResult<Json<$entity>> {
                Ok(Json(state.services.$service.get(&caller, id).await?))
            }

            #[utoipa::path(
                post,
                path = $collection,
                tag = $tag,
                security(("bearer_auth" = [])),
                request_body = $create,
                responses(
                    (status = 201, description = "Entry created", body = $entity),
                    (status = 400, description = "Invalid input")
                )
            )]
            pub async fn create(
                State(state): State<AppState>,
                AuthenticatedUser(caller): AuthenticatedUser,
                Json(request): Json<$create>,
            ) -> AppResult<(StatusCode, Json<$entity>)> {
                let entry = state.services.$service.create(&caller, request).await?;
                Ok((StatusCode::CREATED, Json(entry)))
            }

            #[utoipa::path(
                put,
                path = $item,
                tag = $tag,
                security(("bearer_auth" = [])),
                params(("id" = Uuid, Path, description = "Entry ID")),
                request_body = $update,
                responses(
                    (status = 200, description = "Entry updated", body = $entity),
                    (status = 404, description = "Not found")
                )
            )]
            pub async fn update(
                State(state): State<AppState>,
                AuthenticatedUser(caller): AuthenticatedUser,
                Path(id): Path<Uuid>,
                Json(request): Json<$update>,
            ) -> AppResult<Json<$entity>> {
                Ok(Json(state.services.$service.update(&caller, id, request).await?))
            }

            /// Soft delete; links to books follow
            #[utoipa::path(
                delete,
                path = $item,
                tag = $tag,
                security(("bearer_auth" = [])),
                params(("id" = Uuid, Path, description = "Entry ID")),
                responses(
                    (status = 200, description = "Entry deleted", body = $entity),
                    (status = 404, description = "Not found")
                )
            )]
            pub async fn delete(
                State(state): State<AppState>,
                AuthenticatedUser(caller): AuthenticatedUser,
                Path(id): Path<Uuid>,
            ) -> AppResult<Json<$entity>> {
                Ok(Json(state.services.$service.delete(&caller, id).await?))
            }

            #[utoipa::path(
                get,
                path = $book_links,
                tag = $tag,
                security(("bearer_auth" = [])),
                params(("id" = Uuid, Path, description = "Book ID")),
                responses(
                    (status = 200, description = "Links of the book", body = Vec<$link>)
                )
            )]
            pub async fn links(
                State(state): State<AppState>,
                AuthenticatedUser(caller): AuthenticatedUser,
                Path(book_id): Path<Uuid>,
            ) -> AppResult<Json<Vec<$link>>> {
                Ok(Json(state.services.$service.links_of(&caller, book_id).await?))
            }

            #[utoipa::path(
                post,
                path = $book_link,
                tag = $tag,
                security(("bearer_auth" = [])),
                params(
                    ("id" = Uuid, Path, description = "Book ID"),
                    ("entry_id" = Uuid, Path, description = "Entry ID")
                ),
                responses(
                    (status = 201, description = "Linked", body = $link),
                    (status = 404, description = "Book or entry not found"),
                    (status = 422, description = "Already linked")
                )
            )]
            pub async fn link(
                State(state): State<AppState>,
                AuthenticatedUser(caller): AuthenticatedUser,
                Path((book_id, entry_id)): Path<(Uuid, Uuid)>,
            ) -> AppResult<(StatusCode, Json<$link>)> {
                let link = state.services.$service.link(&caller, book_id, entry_id).await?;
                Ok((StatusCode::CREATED, Json(link)))
            }

            #[utoipa::path(
                delete,
                path = $link_item,
                tag = $tag,
                security(("bearer_auth" = [])),
                params(("id" = Uuid, Path, description = "Link ID")),
                responses(
                    (status = 200, description = "Unlinked", body = $link),
                    (status = 404, description = "Link not found")
                )
            )]
            pub async fn unlink(
                State(state): State<AppState>,
                AuthenticatedUser(caller): AuthenticatedUser,
                Path(id): Path<Uuid>,
            ) -> AppResult<Json<$link>> {
                Ok(Json(state.services.$service.unlink(&caller, id).await?))
            }
        }
    };
}

catalog_endpoints!(
    authors,
    service: authors,
    entity: Author,
    create: CreateAuthor,
    update: UpdateAuthor,
    link: AuthorBook,
    tag: "authors",
    collection: "/authors",
    item: "/authors/{id}",
    book_links: "/books/{id}/authors",
    book_link: "/books/{id}/authors/{entry_id}",
    link_item: "/author-books/{id}",
);

catalog_endpoints!(
    categories,
    service: categories,
    entity: Category,
    create: CategoryRequest,
    update: CategoryRequest,
    link: CategoryBook,
    tag: "categories",
    collection: "/categories",
    item: "/categories/{id}",
    book_links: "/books/{id}/categories",
    book_link: "/books/{id}/categories/{entry_id}",
    link_item: "/category-books/{id}",
);

catalog_endpoints!(
    publishers,
    service: publishers,
    entity: Publisher,
    create: PublisherRequest,
    update: PublisherRequest,
    link: BookPublisher,
    tag: "publishers",
    collection: "/publishers",
    item: "/publishers/{id}",
    book_links: "/books/{id}/publishers",
    book_link: "/books/{id}/publishers/{entry_id}",
    link_item: "/book-publishers/{id}",
);
