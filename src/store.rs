use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::OnConflict,
};

use crate::{
    entities::{genre, movie, movie_genre, search_term},
    error::AppResult,
    models::{MovieDetail, SearchResult},
};

/// Persistence for movies, genres and search terms.
#[derive(Clone)]
pub struct MovieStore {
    db: DatabaseConnection,
}

impl MovieStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_movie(&self, imdb_id: &str) -> AppResult<Option<movie::Model>> {
        Ok(movie::Entity::find_by_id(imdb_id.to_string()).one(&self.db).await?)
    }

    /// Inserts a partial record unless one already exists for the id.
    /// Existing records are left untouched. Returns whether a row was created.
    pub async fn create_partial_movie(&self, result: &SearchResult) -> AppResult<bool> {
        let model = movie::ActiveModel {
            imdb_id: Set(result.imdb_id.clone()),
            title: Set(result.title.clone()),
            year: Set(result.year),
            plot: Set(None),
            runtime_minutes: Set(None),
            is_full_record: Set(false),
        };

        let inserted = movie::Entity::insert(model)
            .on_conflict(OnConflict::column(movie::Column::ImdbId).do_nothing().to_owned())
            .exec_without_returning(&self.db)
            .await?;

        Ok(inserted > 0)
    }

    /// Writes every detail field, marks the record full and replaces its genres,
    /// all in one transaction.
    pub async fn save_full_movie(
        &self,
        imdb_id: &str,
        detail: &MovieDetail,
    ) -> AppResult<movie::Model> {
        let txn = self.db.begin().await?;

        let saved = movie::ActiveModel {
            imdb_id: Set(imdb_id.to_string()),
            title: Set(detail.title.clone()),
            year: Set(detail.year),
            plot: Set(Some(detail.plot.clone())),
            runtime_minutes: Set(Some(detail.runtime_minutes)),
            is_full_record: Set(true),
        }
        .update(&txn)
        .await?;

        movie_genre::Entity::delete_many()
            .filter(movie_genre::Column::MovieImdbId.eq(imdb_id))
            .exec(&txn)
            .await?;

        for name in &detail.genres {
            let genre = get_or_create_genre(&txn, name).await?;
            let link = movie_genre::ActiveModel {
                movie_imdb_id: Set(imdb_id.to_string()),
                genre_id: Set(genre.id),
            };
            movie_genre::Entity::insert(link)
                .on_conflict(
                    OnConflict::columns([
                        movie_genre::Column::MovieImdbId,
                        movie_genre::Column::GenreId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;

        Ok(saved)
    }

    pub async fn genre_names(&self, movie: &movie::Model) -> AppResult<Vec<String>> {
        let genres = movie
            .find_related(genre::Entity)
            .order_by_asc(genre::Column::Name)
            .all(&self.db)
            .await?;
        Ok(genres.into_iter().map(|g| g.name).collect())
    }

    pub async fn partial_movies(&self, limit: u64) -> AppResult<Vec<movie::Model>> {
        let movies = movie::Entity::find()
            .filter(movie::Column::IsFullRecord.eq(false))
            .order_by_asc(movie::Column::ImdbId)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(movies)
    }

    /// Case-insensitive substring match on titles. `fragment` is literal text.
    pub async fn titles_matching(&self, fragment: &str) -> AppResult<Vec<String>> {
        // SQLite's LIKE folds ASCII only, so matching happens on Unicode lower case here.
        let needle = fragment.to_lowercase();
        let titles = movie::Entity::find()
            .select_only()
            .column(movie::Column::Title)
            .order_by_asc(movie::Column::Title)
            .into_tuple::<String>()
            .all(&self.db)
            .await?;
        Ok(titles.into_iter().filter(|title| title.to_lowercase().contains(&needle)).collect())
    }

    pub async fn find_search_term(&self, term: &str) -> AppResult<Option<search_term::Model>> {
        Ok(search_term::Entity::find_by_id(term.to_string()).one(&self.db).await?)
    }

    pub async fn touch_search_term(&self, term: &str, searched_at: i64) -> AppResult<()> {
        let model = search_term::ActiveModel {
            term: Set(term.to_string()),
            last_search: Set(searched_at),
        };

        search_term::Entity::insert(model)
            .on_conflict(
                OnConflict::column(search_term::Column::Term)
                    .update_column(search_term::Column::LastSearch)
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }
}

async fn get_or_create_genre<C: ConnectionTrait>(db: &C, name: &str) -> AppResult<genre::Model> {
    let model = genre::ActiveModel { id: Default::default(), name: Set(name.to_string()) };

    genre::Entity::insert(model)
        .on_conflict(OnConflict::column(genre::Column::Name).do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;

    genre::Entity::find()
        .filter(genre::Column::Name.eq(name))
        .one(db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("genre {name:?} missing after insert").into())
}
