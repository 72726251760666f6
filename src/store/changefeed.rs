/// 変更フィードの配信単位とリース名定義。
///
/// 配信はat-least-onceで、パーティション間の全順序は保証されません。
/// 消費側はメンバーシップ確認やバージョン比較によって冪等に処理します。

/// クラスタリングエンジンが記事フィードに使うリース名。
pub const CLUSTERING_LEASE: &str = "clustering-engine";

/// リアルタイム要約ワーカーがクラスタフィードに使うリース名。
pub const SUMMARY_LEASE: &str = "summarizer-realtime";

/// 変更フィードから取得した1バッチ。
///
/// `cursor` はバッチ内で最後に配信されたドキュメントの位置で、処理完了後に
/// [`crate::store::NewsStore::commit_lease`] へ渡します。空バッチでは `None` です。
#[derive(Debug, Clone)]
pub struct ChangeBatch<T> {
    pub documents: Vec<T>,
    pub cursor: Option<i64>,
}

impl<T> ChangeBatch<T> {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            documents: Vec::new(),
            cursor: None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
