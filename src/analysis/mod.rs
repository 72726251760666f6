/// 見出し解析サブシステム。
///
/// エンティティ抽出、フィンガープリント、類似度スコア、トピック競合判定、
/// スパム/ライフスタイル記事フィルターを提供します。いずれも決定的で、
/// 同じ入力に対して常に同じ結果を返します。
pub mod conflict;
pub mod entities;
pub mod fingerprint;
pub mod similarity;
pub mod spam;
