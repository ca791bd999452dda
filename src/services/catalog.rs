//! Authors, categories and publishers
//!
//! The three share one service shape: CRUD on the entry itself plus
//! linking it to books through its join table.

use std::marker::PhantomData;

use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{
    authorization::{capabilities, Caller},
    groups,
    pipeline::{cache_key, Operation, Pipeline},
};
use crate::{
    error::AppResult,
    models::{
        author::{CreateAuthor, UpdateAuthor},
        category::CategoryRequest,
        publisher::PublisherRequest,
        Audit, Author, AuthorBook, Book, BookPublisher, Category, CategoryBook, ListQuery,
        Publisher,
    },
    repository::{Page, PageRequest, Query, Repository, Table},
    rules,
};

/// Capabilities required by each operation of one area
pub struct Requirements {
    pub read: &'static [&'static str],
    pub create: &'static [&'static str],
    pub update: &'static [&'static str],
    pub delete: &'static [&'static str],
}

/// Operation names of one area
pub struct OperationNames {
    pub create: &'static str,
    pub update: &'static str,
    pub delete: &'static str,
    pub get: &'static str,
    pub list: &'static str,
    pub link: &'static str,
    pub unlink: &'static str,
    pub links: &'static str,
}

/// An entity that can be attached to books
pub trait CatalogEntry: Table + Serialize + DeserializeOwned {
    type Create: Validate + Send + 'static;
    type Update: Validate + Send + 'static;
    /// Join row between a book and this entry
    type Link: Table + Serialize + DeserializeOwned;

    const NAMES: OperationNames;
    const REQUIRES: Requirements;
    const LINK_REQUIRES: Requirements;
    /// Cache group of list reads
    const GROUP: &'static str;
    /// Groups evicted by commands; book details embed catalog entries
    const INVALIDATES: &'static [&'static str];
    /// Column of the join table referencing this entry
    const LINK_COLUMN: &'static str;

    fn create(request: Self::Create) -> Self;
    fn apply(&mut self, request: Self::Update);
    fn link(book_id: Uuid, target_id: Uuid) -> Self::Link;
}

impl CatalogEntry for Author {
    type Create = CreateAuthor;
    type Update = UpdateAuthor;
    type Link = AuthorBook;

    const NAMES: OperationNames = OperationNames {
        create: "CreateAuthor",
        update: "UpdateAuthor",
        delete: "DeleteAuthor",
        get: "GetByIdAuthor",
        list: "GetListAuthors",
        link: "CreateAuthorBook",
        unlink: "DeleteAuthorBook",
        links: "GetListAuthorBooks",
    };
    const REQUIRES: Requirements = Requirements {
        read: &[capabilities::authors::READ],
        create: &[capabilities::authors::CREATE],
        update: &[capabilities::authors::UPDATE],
        delete: &[capabilities::authors::DELETE],
    };
    const LINK_REQUIRES: Requirements = Requirements {
        read: &[capabilities::author_books::READ],
        create: &[capabilities::author_books::CREATE],
        update: &[capabilities::author_books::UPDATE],
        delete: &[capabilities::author_books::DELETE],
    };
    const GROUP: &'static str = groups::AUTHORS;
    const INVALIDATES: &'static [&'static str] = &[groups::AUTHORS, groups::BOOKS];
    const LINK_COLUMN: &'static str = "author_id";

    fn create(request: CreateAuthor) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: request.name,
            identity_number: request.identity_number,
            audit: Audit::new(),
        }
    }

    fn apply(&mut self, request: UpdateAuthor) {
        self.name = request.name;
        self.identity_number = request.identity_number;
    }

    fn link(book_id: Uuid, author_id: Uuid) -> AuthorBook {
        AuthorBook {
            id: Uuid::new_v4(),
            author_id,
            book_id,
            audit: Audit::new(),
        }
    }
}

impl CatalogEntry for Category {
    type Create = CategoryRequest;
    type Update = CategoryRequest;
    type Link = CategoryBook;

    const NAMES: OperationNames = OperationNames {
        create: "CreateCategory",
        update: "UpdateCategory",
        delete: "DeleteCategory",
        get: "GetByIdCategory",
        list: "GetListCategories",
        link: "CreateCategoryBook",
        unlink: "DeleteCategoryBook",
        links: "GetListCategoryBooks",
    };
    const REQUIRES: Requirements = Requirements {
        read: &[capabilities::categories::READ],
        create: &[capabilities::categories::CREATE],
        update: &[capabilities::categories::UPDATE],
        delete: &[capabilities::categories::DELETE],
    };
    const LINK_REQUIRES: Requirements = Requirements {
        read: &[capabilities::category_books::READ],
        create: &[capabilities::category_books::CREATE],
        update: &[capabilities::category_books::UPDATE],
        delete: &[capabilities::category_books::DELETE],
    };
    const GROUP: &'static str = groups::CATEGORIES;
    const INVALIDATES: &'static [&'static str] = &[groups::CATEGORIES, groups::BOOKS];
    const LINK_COLUMN: &'static str = "category_id";

    fn create(request: CategoryRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: request.name,
            audit: Audit::new(),
        }
    }

    fn apply(&mut self, request: CategoryRequest) {
        self.name = request.name;
    }

    fn link(book_id: Uuid, category_id: Uuid) -> CategoryBook {
        CategoryBook {
            id: Uuid::new_v4(),
            book_id,
            category_id,
            audit: Audit::new(),
        }
    }
}

impl CatalogEntry for Publisher {
    type Create = PublisherRequest;
    type Update = PublisherRequest;
    type Link = BookPublisher;

    const NAMES: OperationNames = OperationNames {
        create: "CreatePublisher",
        update: "UpdatePublisher",
        delete: "DeletePublisher",
        get: "GetByIdPublisher",
        list: "GetListPublishers",
        link: "CreateBookPublisher",
        unlink: "DeleteBookPublisher",
        links: "GetListBookPublishers",
    };
    const REQUIRES: Requirements = Requirements {
        read: &[capabilities::publishers::READ],
        create: &[capabilities::publishers::CREATE],
        update: &[capabilities::publishers::UPDATE],
        delete: &[capabilities::publishers::DELETE],
    };
    const LINK_REQUIRES: Requirements = Requirements {
        read: &[capabilities::book_publishers::READ],
        create: &[capabilities::book_publishers::CREATE],
        update: &[capabilities::book_publishers::UPDATE],
        delete: &[capabilities::book_publishers::DELETE],
    };
    const GROUP: &'static str = groups::PUBLISHERS;
    const INVALIDATES: &'static [&'static str] = &[groups::PUBLISHERS, groups::BOOKS];
    const LINK_COLUMN: &'static str = "publisher_id";

    fn create(request: PublisherRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: request.name,
            audit: Audit::new(),
        }
    }

    fn apply(&mut self, request: PublisherRequest) {
        self.name = request.name;
    }

    fn link(book_id: Uuid, publisher_id: Uuid) -> BookPublisher {
        BookPublisher {
            id: Uuid::new_v4(),
            book_id,
            publisher_id,
            audit: Audit::new(),
        }
    }
}

pub struct CatalogService<E> {
    pipeline: Pipeline,
    _entry: PhantomData<fn() -> E>,
}

impl<E> Clone for CatalogService<E> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            _entry: PhantomData,
        }
    }
}

impl<E: CatalogEntry> CatalogService<E> {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            _entry: PhantomData,
        }
    }

    pub async fn create(&self, caller: &Caller, request: E::Create) -> AppResult<E> {
        request.validate()?;
        let operation = Operation::command(E::NAMES.create)
            .requires(E::REQUIRES.create)
            .invalidates(E::INVALIDATES);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move { repository.table::<E>().add(E::create(request)).await }.boxed()
            })
            .await
    }

    pub async fn update(&self, caller: &Caller, id: Uuid, request: E::Update) -> AppResult<E> {
        request.validate()?;
        let operation = Operation::command(E::NAMES.update)
            .requires(E::REQUIRES.update)
            .invalidates(E::INVALIDATES);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let mut entry = repository.require::<E>(id).await?;
                    entry.apply(request);
                    repository.table::<E>().update(entry).await
                }
                .boxed()
            })
            .await
    }

    /// Soft delete; links to books follow
    pub async fn delete(&self, caller: &Caller, id: Uuid) -> AppResult<E> {
        let operation = Operation::command(E::NAMES.delete)
            .requires(E::REQUIRES.delete)
            .invalidates(E::INVALIDATES);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let entry = repository.require::<E>(id).await?;
                    repository.table::<E>().delete(entry, false).await
                }
                .boxed()
            })
            .await
    }

    pub async fn get(&self, caller: &Caller, id: Uuid) -> AppResult<E> {
        let operation = Operation::query(E::NAMES.get).requires(E::REQUIRES.read);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move { repository.require::<E>(id).await }.boxed()
            })
            .await
    }

    pub async fn list(&self, caller: &Caller, params: ListQuery) -> AppResult<Page<E>> {
        let operation = Operation::query(E::NAMES.list)
            .requires(E::REQUIRES.read)
            .cached(cache_key(E::NAMES.list, &params), E::GROUP);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let query = Query::new()
                        .contains_opt("name", params.name.as_deref())
                        .paginate(PageRequest::from_params(params.page, params.per_page));
                    repository.table::<E>().list(query).await
                }
                .boxed()
            })
            .await
    }

    /// Attach the entry to a book
    pub async fn link(&self, caller: &Caller, book_id: Uuid, entry_id: Uuid) -> AppResult<E::Link> {
        let operation = Operation::command(E::NAMES.link)
            .requires(E::LINK_REQUIRES.create)
            .invalidates(&[groups::BOOKS]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    repository.require::<Book>(book_id).await?;
                    repository.require::<E>(entry_id).await?;
                    rules::book::check_not_linked::<E::Link>(
                        &repository,
                        book_id,
                        E::LINK_COLUMN,
                        entry_id,
                    )
                    .await?;
                    repository.table::<E::Link>().add(E::link(book_id, entry_id)).await
                }
                .boxed()
            })
            .await
    }

    /// Remove a link by its id
    pub async fn unlink(&self, caller: &Caller, link_id: Uuid) -> AppResult<E::Link> {
        let operation = Operation::command(E::NAMES.unlink)
            .requires(E::LINK_REQUIRES.delete)
            .invalidates(&[groups::BOOKS]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let link = repository.require::<E::Link>(link_id).await?;
                    repository.table::<E::Link>().delete(link, false).await
                }
                .boxed()
            })
            .await
    }

    /// Live links of one book
    pub async fn links_of(&self, caller: &Caller, book_id: Uuid) -> AppResult<Vec<E::Link>> {
        let operation = Operation::query(E::NAMES.links).requires(E::LINK_REQUIRES.read);

        self.pipeline
            .run(caller, operation, move |repository: Repository| {
                async move {
                    let links = repository
                        .table::<E::Link>()
                        .list(Query::new().eq("book_id", book_id))
                        .await?;
                    Ok(links.items)
                }
                .boxed()
            })
            .await
    }
}
