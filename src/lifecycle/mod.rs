/// クラスタの検証ライフサイクル。
///
/// 更新時の状態評価（純関数）と、周期的なスイーパーによる降格・
/// アーカイブ・保持期限の掃除を担います。
pub mod status;
pub mod sweeper;
