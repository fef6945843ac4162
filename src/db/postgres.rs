use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;

use super::store::{CatalogCounts, CatalogStore, MovieQuery};
use crate::{
    error::AppResult,
    models::{
        Favorite, Genre, Movie, MovieActivity, MovieId, MovieOrder, NewRating, NewWatch, Rating,
        SimilarUser, Tag, UserId, WatchHistory,
    },
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the schema migrations bundled with the binary
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// `ILIKE` pattern matching `search` anywhere, with its wildcards taken literally
fn contains_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

const MOVIE_COLUMNS: &str = "m.id, m.title, m.description, m.release_date, m.duration, \
     m.external_rating, m.popularity, m.created_at";

#[derive(sqlx::FromRow)]
struct MovieRow {
    id: i64,
    title: String,
    description: String,
    release_date: NaiveDate,
    duration: Option<i32>,
    external_rating: Option<f64>,
    popularity: f64,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LabelRow {
    movie_id: i64,
    id: i64,
    name: String,
}

#[derive(sqlx::FromRow)]
struct CountRow {
    users: i64,
    movies: i64,
    ratings: i64,
}

/// Catalog store backed by PostgreSQL
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attaches genres and tags to movie rows with one batch query each
    async fn hydrate(&self, rows: Vec<MovieRow>) -> AppResult<Vec<Movie>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

        let genre_rows: Vec<LabelRow> = sqlx::query_as(
            r#"
            SELECT mg.movie_id, g.id, g.name
            FROM movie_genres mg
            JOIN genres g ON g.id = mg.genre_id
            WHERE mg.movie_id = ANY($1)
            ORDER BY g.name
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let tag_rows: Vec<LabelRow> = sqlx::query_as(
            r#"
            SELECT mt.movie_id, t.id, t.name
            FROM movie_tags mt
            JOIN tags t ON t.id = mt.tag_id
            WHERE mt.movie_id = ANY($1)
            ORDER BY t.name
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut genres: HashMap<i64, Vec<Genre>> = HashMap::new();
        for row in genre_rows {
            genres.entry(row.movie_id).or_default().push(Genre {
                id: row.id,
                name: row.name,
            });
        }

        let mut tags: HashMap<i64, Vec<Tag>> = HashMap::new();
        for row in tag_rows {
            tags.entry(row.movie_id).or_default().push(Tag {
                id: row.id,
                name: row.name,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| Movie {
                genres: genres.remove(&row.id).unwrap_or_default(),
                tags: tags.remove(&row.id).unwrap_or_default(),
                id: row.id,
                title: row.title,
                description: row.description,
                release_date: row.release_date,
                duration: row.duration,
                external_rating: row.external_rating,
                popularity: row.popularity,
                created_at: row.created_at,
            })
            .collect())
    }
}

fn order_clause(order: MovieOrder) -> &'static str {
    match order {
        MovieOrder::Popularity => {
            " ORDER BY m.popularity DESC, m.external_rating DESC NULLS LAST, m.release_date DESC, m.id ASC"
        }
        MovieOrder::Rating => {
            " ORDER BY m.external_rating DESC NULLS LAST, m.popularity DESC, m.id ASC"
        }
        MovieOrder::ReleaseDate => " ORDER BY m.release_date DESC, m.id ASC",
        MovieOrder::Title => " ORDER BY m.title ASC, m.id ASC",
    }
}

#[async_trait::async_trait]
impl CatalogStore for PgCatalogStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn counts(&self) -> AppResult<CatalogCounts> {
        let row: CountRow = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS users,
                (SELECT COUNT(*) FROM movies) AS movies,
                (SELECT COUNT(*) FROM ratings) AS ratings
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CatalogCounts {
            users: row.users,
            movies: row.movies,
            ratings: row.ratings,
        })
    }

    async fn user_exists(&self, user_id: UserId) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn find_movies(&self, query: &MovieQuery) -> AppResult<Vec<Movie>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM movies m WHERE TRUE", MOVIE_COLUMNS));

        if let Some(search) = &query.search {
            builder
                .push(" AND m.title ILIKE ")
                .push_bind(contains_pattern(search))
                .push(" ESCAPE '\\'");
        }
        if let Some(genre) = &query.genre {
            builder
                .push(
                    " AND EXISTS (SELECT 1 FROM movie_genres mg JOIN genres g ON g.id = mg.genre_id \
                     WHERE mg.movie_id = m.id AND g.name = ",
                )
                .push_bind(genre.clone())
                .push(")");
        }
        if let Some(min_rating) = query.min_external_rating {
            builder
                .push(" AND m.external_rating >= ")
                .push_bind(min_rating);
        }
        if let Some(created_after) = query.created_after {
            builder.push(" AND m.created_at >= ").push_bind(created_after);
        }
        if !query.exclude.is_empty() {
            builder
                .push(" AND NOT (m.id = ANY(")
                .push_bind(query.exclude.clone())
                .push("))");
        }

        builder.push(order_clause(query.order));
        builder
            .push(" LIMIT ")
            .push_bind(query.limit as i64)
            .push(" OFFSET ")
            .push_bind(query.offset as i64);

        let rows: Vec<MovieRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn find_movies_by_ids(&self, ids: &[MovieId]) -> AppResult<Vec<Movie>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<MovieRow> = sqlx::query_as(&format!(
            "SELECT {} FROM movies m WHERE m.id = ANY($1)",
            MOVIE_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn get_movie(&self, movie_id: MovieId) -> AppResult<Option<Movie>> {
        let movies = self.find_movies_by_ids(&[movie_id]).await?;
        Ok(movies.into_iter().next())
    }

    async fn list_genres(&self) -> AppResult<Vec<Genre>> {
        let genres = sqlx::query_as("SELECT id, name FROM genres ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(genres)
    }

    async fn find_ratings_by_user(&self, user_id: UserId) -> AppResult<Vec<Rating>> {
        let ratings = sqlx::query_as(
            r#"
            SELECT user_id, movie_id, score, review, rated_at, updated_at
            FROM ratings
            WHERE user_id = $1
            ORDER BY rated_at DESC, movie_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ratings)
    }

    async fn find_favorites_by_user(&self, user_id: UserId) -> AppResult<Vec<Favorite>> {
        let favorites = sqlx::query_as(
            r#"
            SELECT user_id, movie_id, favorited_at
            FROM favorites
            WHERE user_id = $1
            ORDER BY favorited_at DESC, movie_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(favorites)
    }

    async fn find_watch_history_by_user(&self, user_id: UserId) -> AppResult<Vec<WatchHistory>> {
        let history = sqlx::query_as(
            r#"
            SELECT user_id, movie_id, progress_minutes, completed, watched_at
            FROM watch_history
            WHERE user_id = $1
            ORDER BY watched_at DESC, movie_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(history)
    }

    async fn find_ratings_by_movie(&self, movie_id: MovieId) -> AppResult<Vec<Rating>> {
        let ratings = sqlx::query_as(
            r#"
            SELECT user_id, movie_id, score, review, rated_at, updated_at
            FROM ratings
            WHERE movie_id = $1
            ORDER BY rated_at DESC, user_id ASC
            "#,
        )
        .bind(movie_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ratings)
    }

    async fn find_ratings_by_users(&self, user_ids: &[UserId]) -> AppResult<Vec<Rating>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ratings = sqlx::query_as(
            r#"
            SELECT user_id, movie_id, score, review, rated_at, updated_at
            FROM ratings
            WHERE user_id = ANY($1)
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(ratings)
    }

    async fn find_similar_users(
        &self,
        user_id: UserId,
        k: usize,
        min_overlap: usize,
    ) -> AppResult<Vec<SimilarUser>> {
        let similar = sqlx::query_as(
            r#"
            WITH me AS (
                SELECT movie_id, score FROM ratings WHERE user_id = $1
            ),
            me_norm AS (
                SELECT sqrt(SUM(score * score)) AS norm FROM me
            ),
            norms AS (
                SELECT user_id, sqrt(SUM(score * score)) AS norm
                FROM ratings
                WHERE user_id <> $1
                GROUP BY user_id
            ),
            dots AS (
                SELECT r.user_id, SUM(r.score * me.score) AS dot, COUNT(*) AS overlap
                FROM ratings r
                JOIN me ON me.movie_id = r.movie_id
                WHERE r.user_id <> $1
                GROUP BY r.user_id
            )
            SELECT dots.user_id, dots.dot / (norms.norm * me_norm.norm) AS similarity, dots.overlap
            FROM dots
            JOIN norms ON norms.user_id = dots.user_id
            CROSS JOIN me_norm
            WHERE dots.overlap >= $3 AND me_norm.norm > 0
            ORDER BY similarity DESC, dots.user_id ASC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(k as i64)
        .bind(min_overlap as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(similar)
    }

    async fn upsert_rating(&self, rating: &NewRating) -> AppResult<Rating> {
        let stored = sqlx::query_as(
            r#"
            INSERT INTO ratings (user_id, movie_id, score, review)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, movie_id)
            DO UPDATE SET score = EXCLUDED.score, review = EXCLUDED.review, updated_at = now()
            RETURNING user_id, movie_id, score, review, rated_at, updated_at
            "#,
        )
        .bind(rating.user_id)
        .bind(rating.movie_id)
        .bind(rating.score.value())
        .bind(&rating.review)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn delete_rating(&self, user_id: UserId, movie_id: MovieId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM ratings WHERE user_id = $1 AND movie_id = $2")
            .bind(user_id)
            .bind(movie_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn toggle_favorite(
        &self,
        user_id: UserId,
        movie_id: MovieId,
    ) -> AppResult<Option<Favorite>> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND movie_id = $2")
            .bind(user_id)
            .bind(movie_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let favorite = if removed > 0 {
            None
        } else {
            let inserted: Option<Favorite> = sqlx::query_as(
                r#"
                INSERT INTO favorites (user_id, movie_id)
                VALUES ($1, $2)
                ON CONFLICT (user_id, movie_id) DO NOTHING
                RETURNING user_id, movie_id, favorited_at
                "#,
            )
            .bind(user_id)
            .bind(movie_id)
            .fetch_optional(&mut *tx)
            .await?;

            match inserted {
                Some(favorite) => Some(favorite),
                // a concurrent toggle inserted it first; it stays favorited
                None => {
                    sqlx::query_as(
                        "SELECT user_id, movie_id, favorited_at FROM favorites \
                         WHERE user_id = $1 AND movie_id = $2",
                    )
                    .bind(user_id)
                    .bind(movie_id)
                    .fetch_optional(&mut *tx)
                    .await?
                }
            }
        };

        tx.commit().await?;
        Ok(favorite)
    }

    async fn upsert_watch(&self, watch: &NewWatch) -> AppResult<WatchHistory> {
        let stored = sqlx::query_as(
            r#"
            INSERT INTO watch_history (user_id, movie_id, progress_minutes, completed)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, movie_id)
            DO UPDATE SET progress_minutes = EXCLUDED.progress_minutes,
                          completed = EXCLUDED.completed,
                          watched_at = now()
            RETURNING user_id, movie_id, progress_minutes, completed, watched_at
            "#,
        )
        .bind(watch.user_id)
        .bind(watch.movie_id)
        .bind(watch.progress_minutes)
        .bind(watch.completed)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn delete_watch(&self, user_id: UserId, movie_id: MovieId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM watch_history WHERE user_id = $1 AND movie_id = $2")
            .bind(user_id)
            .bind(movie_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn movie_activity(&self) -> AppResult<Vec<MovieActivity>> {
        let activity = sqlx::query_as(
            r#"
            SELECT m.id AS movie_id,
                   COALESCE(r.cnt, 0) AS rating_count,
                   r.avg AS average_rating,
                   COALESCE(f.cnt, 0) AS favorite_count,
                   COALESCE(w.cnt, 0) AS completed_watches
            FROM movies m
            LEFT JOIN (
                SELECT movie_id, COUNT(*) AS cnt, AVG(score) AS avg FROM ratings GROUP BY movie_id
            ) r ON r.movie_id = m.id
            LEFT JOIN (
                SELECT movie_id, COUNT(*) AS cnt FROM favorites GROUP BY movie_id
            ) f ON f.movie_id = m.id
            LEFT JOIN (
                SELECT movie_id, COUNT(*) AS cnt FROM watch_history WHERE completed GROUP BY movie_id
            ) w ON w.movie_id = m.id
            ORDER BY m.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(activity)
    }

    async fn update_popularity(&self, scores: &[(MovieId, f64)]) -> AppResult<()> {
        if scores.is_empty() {
            return Ok(());
        }

        let (ids, values): (Vec<i64>, Vec<f64>) = scores.iter().copied().unzip();

        sqlx::query(
            r#"
            UPDATE movies AS m
            SET popularity = u.popularity, updated_at = now()
            FROM UNNEST($1::BIGINT[], $2::DOUBLE PRECISION[]) AS u(id, popularity)
            WHERE m.id = u.id
            "#,
        )
        .bind(ids)
        .bind(values)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
